//! Cadence CLI application.
//!
//! Runs plan definitions with the built-in agents and manages the plans kept
//! in the checkpoint store.

mod agents;
mod args;
mod cli;
mod renderer;

use anyhow::{Context, Result};
use args::{Args, Commands};
use cadence_core::{OrchestratorBuilder, OrchestratorConfig};
use clap::Parser;
use cli::Cli;
use log::info;
use renderer::TerminalRenderer;
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        config,
        backend,
        no_color,
        command,
    } = Args::parse();

    let mut config = match config {
        Some(path) => OrchestratorConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    if let Some(backend) = backend {
        config.store.backend = backend.into();
    }

    let registry = agents::builtin_registry();
    let capabilities: Vec<String> = registry
        .capabilities()
        .iter()
        .map(ToString::to_string)
        .collect();

    let orchestrator = OrchestratorBuilder::new()
        .with_config(config)
        .with_registry(registry)
        .with_database_path(database_file)
        .build()
        .await
        .context("Failed to initialize orchestrator")?;

    info!("Cadence started ({} store)", orchestrator.store().backend());

    let cli = Cli::new(orchestrator, TerminalRenderer::new(!no_color));
    match command {
        Some(Run(args)) => cli.run(args).await,
        Some(Submit(args)) => cli.submit(args).await,
        Some(Show(args)) => cli.show(args).await,
        Some(Resume(args)) => cli.resume(args).await,
        Some(Cancel(args)) => cli.cancel(args).await,
        Some(Skip(args)) => cli.skip(args).await,
        Some(Checkpoints(args)) => cli.checkpoints(args).await,
        Some(Rollback(args)) => cli.rollback(args).await,
        Some(Capabilities) => cli.capabilities(&capabilities),
        Some(List) | None => cli.list().await,
    }
}
