//! Display formatting for models, collections and control results.
//!
//! Domain models implement [`std::fmt::Display`] directly; collections and
//! operation outcomes use small wrapper types. Everything renders as markdown,
//! which the CLI hands to its terminal renderer.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Domain Models  │    │ Wrapper Types   │    │   Markdown      │
//! │  (Plan, Step)   │───▶│ (Steps, ...)    │───▶│    Output       │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`collections`]: [`Steps`], [`PlanReports`], [`CheckpointHistory`]
//! - [`results`]: [`ControlResult`], [`SkipResult`], [`RollbackResult`]
//! - [`datetime`]: [`LocalDateTime`]
//! - [`models`]: Display implementations for domain models

pub mod collections;
pub mod datetime;
pub mod models;
pub mod results;

pub use collections::{CheckpointHistory, PlanReports, Steps};
pub use datetime::LocalDateTime;
pub use results::{ControlResult, RollbackResult, SkipResult};
