//! Data models for plans, steps, results and checkpoints.
//!
//! These are pure records: they carry no scheduling or persistence logic.
//! Display implementations live in [`crate::display::models`] so that the data
//! structures stay independent of presentation.
//!
//! # Ownership
//!
//! A [`Plan`] exclusively owns its [`Step`]s. Each step owns at most one
//! [`StepResult`], replaced whenever the step runs again; earlier results only
//! survive inside [`Checkpoint`] snapshots.
//!
//! # Examples
//!
//! ```rust
//! use cadence_core::models::{Plan, Step, StepStatus};
//!
//! let plan = Plan::new("Summarise the contract")
//!     .with_step(Step::new("fetch", "search"))
//!     .with_step(Step::new("summarise", "llm").depends_on("fetch"));
//!
//! assert_eq!(plan.steps[1].sequence_index, 1);
//! assert_eq!(plan.steps[0].status, StepStatus::Pending);
//! assert_eq!(plan.progress_percentage(), 0.0);
//! ```

pub mod checkpoint;
pub mod ids;
pub mod plan;
pub mod result;
pub mod status;
pub mod step;
pub mod summary;

#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, CheckpointId};
pub use ids::{Capability, PlanId, StepId};
pub use plan::{Plan, StepCounts};
pub use result::{DependencyOutput, StepContext, StepResult};
pub use status::{FailurePolicy, PlanStatus, ResultStatus, StepStatus};
pub use step::Step;
pub use summary::{PlanReport, StepFailure};
