//! High-level orchestration API.
//!
//! [`PlanOrchestrator`] is the entry point of the library. It accepts plans,
//! drives their execution wave by wave, persists checkpoints and exposes the
//! control operations (pause, resume, cancel, add/skip steps, rollback).
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────┐  commands   ┌──────────────────┐  outcomes  ┌──────────────────┐
//! │ PlanOrchestrator │────────────▶│  driver task     │◀───────────│  StepExecutor    │
//! │  (plan_ops,      │  (mpsc)     │  (one per run,   │ (JoinSet)  │  (one task per   │
//! │   step_ops)      │◀────────────│   owns the Plan) │───────────▶│   running step)  │
//! └──────────────────┘  snapshots  └──────────────────┘  dispatch  └──────────────────┘
//!                        (watch)            │
//!                                           ▼ checkpoint per outcome / wave
//!                                   ┌──────────────────┐
//!                                   │ CheckpointStore  │
//!                                   └──────────────────┘
//! ```
//!
//! While a plan runs, its driver task is the only writer of its state. Control
//! operations reach the driver through a command channel; readers observe the
//! latest snapshot. Idle plans (pending, paused or finished) are held by the
//! orchestrator and mutated directly.
//!
//! ## Submodules
//!
//! - [`builder`]: Factory for creating [`PlanOrchestrator`] instances
//! - `plan_ops`: Plan lifecycle operations (submit, run, pause, resume, ...)
//! - `step_ops`: Step mutations (add, skip)
//! - `driver`: The per-run wave loop
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cadence_core::{
//!     models::{Plan, Step},
//!     store::{StoreBackend, StoreConfig},
//!     OrchestratorBuilder, OrchestratorConfig,
//! };
//! # use cadence_core::agent::{Agent, AgentError, AgentOutput, StepInput};
//! # use cadence_core::models::StepContext;
//! # struct Search;
//! # #[async_trait::async_trait]
//! # impl Agent for Search {
//! #     async fn execute_step(&self, _: &StepInput, _: &StepContext) -> Result<AgentOutput, AgentError> {
//! #         Ok(AgentOutput::success(serde_json::json!("found")))
//! #     }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig {
//!     store: StoreConfig::new(StoreBackend::File).with_path("/tmp/cadence"),
//!     ..OrchestratorConfig::default()
//! };
//! let orchestrator = OrchestratorBuilder::new()
//!     .with_config(config)
//!     .with_agent("search", Arc::new(Search))
//!     .build()
//!     .await?;
//!
//! let plan = Plan::new("Find the contract")
//!     .with_step(Step::new("lookup", "search"));
//! let plan_id = orchestrator.start(plan).await?;
//! let report = orchestrator.wait(&plan_id).await?;
//! assert!(report.succeeded());
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, mpsc, watch, Mutex};

use crate::{
    config::OrchestratorConfig,
    events::{EventBus, PlanEvent},
    executor::{CancelHandle, StepExecutor},
    models::{Plan, PlanId},
    registry::AgentRegistry,
    store::CheckpointStore,
};

pub mod builder;
mod driver;
mod plan_ops;
mod step_ops;


pub use builder::OrchestratorBuilder;

/// Dependency-driven plan orchestrator.
///
/// Cheap to clone; clones share plans, store and event bus.
#[derive(Clone)]
pub struct PlanOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    executor: StepExecutor,
    store: Arc<dyn CheckpointStore>,
    events: EventBus,
    max_concurrency: usize,
    plans: Mutex<HashMap<PlanId, PlanSlot>>,
}

/// Where a known plan currently lives.
enum PlanSlot {
    /// Not running; the orchestrator owns the plan.
    Idle {
        plan: Plan,
        /// Persistence failure that stopped the last run
        halted: Option<String>,
    },
    /// A driver task owns the plan.
    Running(RunHandle),
}

/// The orchestrator's side of a running driver.
struct RunHandle {
    commands: mpsc::Sender<driver::DriverCommand>,
    cancel: CancelHandle,
    snapshot: watch::Receiver<Plan>,
    finished: watch::Receiver<bool>,
}

impl PlanOrchestrator {
    /// Starts building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub(crate) fn new(
        config: &OrchestratorConfig,
        registry: AgentRegistry,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let executor = StepExecutor::new(
            Arc::new(registry),
            Arc::new(config.retry.clone()),
            Arc::new(config.quality.clone()),
            events.clone(),
            config.step_timeout(),
        );
        log::debug!(
            "Orchestrator ready: backend={}, max_concurrency={}",
            store.backend(),
            config.max_concurrency
        );

        Self {
            inner: Arc::new(Inner {
                executor,
                store,
                events,
                max_concurrency: config.max_concurrency.max(1),
                plans: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribes to lifecycle events of every plan.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.inner.events.subscribe()
    }

    /// The event bus shared with the executor.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The backing checkpoint store.
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.inner.store
    }
}

impl std::fmt::Debug for PlanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanOrchestrator")
            .field("backend", &self.inner.store.backend())
            .field("max_concurrency", &self.inner.max_concurrency)
            .finish_non_exhaustive()
    }
}
