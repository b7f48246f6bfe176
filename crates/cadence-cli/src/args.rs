use std::path::PathBuf;

use cadence_core::StoreBackend;
use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::{CheckpointArgs, PlanFileArgs, PlanIdArgs, RollbackArgs, SkipArgs};

/// Command-line driver for the cadence plan orchestrator
///
/// Cadence runs plans: goals broken into steps that depend on each other's
/// outputs. Steps are executed in dependency waves by the agent registered for
/// their capability, retried on transient failures and checkpointed after
/// every wave so interrupted runs can be resumed or rolled back.
#[derive(Parser)]
#[command(version, about, name = "cadence")]
pub struct Args {
    /// Path to the SQLite database file (or checkpoint directory with
    /// `--backend file`). Defaults to $XDG_DATA_HOME/cadence/cadence.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// JSON configuration file with concurrency, retry and quality settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend, overriding the configuration file
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands. Without a command, stored plans are listed.
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a plan definition and run it to the end
    #[command(alias = "r")]
    Run(PlanFileArgs),
    /// Validate a plan definition and store it without running
    Submit(PlanFileArgs),
    /// Show a stored plan with its steps and results
    #[command(alias = "s")]
    Show(PlanIdArgs),
    /// List stored plans
    #[command(aliases = ["l", "ls"])]
    List,
    /// Continue a paused or interrupted plan
    Resume(PlanIdArgs),
    /// Cancel a plan that has not finished
    Cancel(PlanIdArgs),
    /// Skip a step and everything depending on it
    Skip(SkipArgs),
    /// List the checkpoints of a plan
    #[command(alias = "cp")]
    Checkpoints(CheckpointArgs),
    /// Restore a plan from one of its checkpoints
    Rollback(RollbackArgs),
    /// List the capabilities served by the built-in agents
    Capabilities,
}

/// Command-line representation of [`StoreBackend`].
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// SQLite, falling back to files if the database cannot be opened
    Auto,
    /// SQLite only
    Sqlite,
    /// One JSON file per checkpoint
    File,
}

impl From<BackendArg> for StoreBackend {
    fn from(val: BackendArg) -> Self {
        match val {
            BackendArg::Auto => StoreBackend::Auto,
            BackendArg::Sqlite => StoreBackend::Sqlite,
            BackendArg::File => StoreBackend::File,
        }
    }
}
