//! Core library for the Cadence plan orchestrator.
//!
//! A plan is a goal plus a set of steps connected by data dependencies. The
//! orchestrator groups steps into dependency waves, dispatches every step of a
//! wave to the agent registered for its capability, retries transient
//! failures, filters results through per-capability quality gates and writes a
//! checkpoint after every wave so that an interrupted plan can be resumed or
//! rolled back.
//!
//! # Crate Layout
//!
//! - [`models`]: Plans, steps, results, checkpoints and reports
//! - [`graph`]: Cycle detection and wave computation
//! - [`agent`] and [`registry`]: The agent contract and capability lookup
//! - [`retry`] and [`quality`]: Failure classification, backoff and quality
//!   gates
//! - [`executor`]: Running a single step with retries, timeouts and
//!   cancellation
//! - [`orchestrator`]: Plan lifecycle and wave scheduling
//! - [`store`] and [`db`]: SQLite and file-based checkpoint persistence
//! - [`events`]: Lifecycle notifications
//! - [`display`]: Markdown rendering for the terminal
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cadence_core::{
//!     agent::{Agent, AgentError, AgentOutput, StepInput},
//!     models::{Plan, Step, StepContext},
//!     OrchestratorBuilder,
//! };
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Agent for Echo {
//!     async fn execute_step(
//!         &self,
//!         input: &StepInput,
//!         _context: &StepContext,
//!     ) -> Result<AgentOutput, AgentError> {
//!         Ok(AgentOutput::success(serde_json::Value::Object(input.parameters.clone())))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = OrchestratorBuilder::new()
//!     .with_database_path(Some("cadence.db"))
//!     .with_agent("echo", Arc::new(Echo))
//!     .build()
//!     .await?;
//!
//! let plan = Plan::new("Say hello twice")
//!     .with_step(Step::new("first", "echo").with_input("text", "hello".into()))
//!     .with_step(Step::new("second", "echo").depends_on("first"));
//!
//! let plan_id = orchestrator.start(plan).await?;
//! let report = orchestrator.wait(&plan_id).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod registry;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentOutput, StepInput};
pub use config::OrchestratorConfig;
pub use db::Database;
pub use error::{OrchestratorError, Result};
pub use events::{EventBus, PlanEvent};
pub use models::{
    Checkpoint, CheckpointId, FailurePolicy, Plan, PlanId, PlanReport, PlanStatus, Step, StepId,
    StepStatus,
};
pub use orchestrator::{OrchestratorBuilder, PlanOrchestrator};
pub use registry::{AgentDescriptor, AgentRegistry};
pub use store::{CheckpointStore, FileStore, SqliteStore, StoreBackend, StoreConfig};
