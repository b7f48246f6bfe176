//! Status enumerations for plans, steps and step results.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type-safe enumeration of plan statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// Submitted, not yet started
    #[default]
    Pending,

    /// A driver is executing waves
    Running,

    /// Halted on request, resumable
    Paused,

    /// Every step is terminal with no blocking failure
    Completed,

    /// A step failed under a non-tolerant failure policy
    Failed,

    /// Cancelled on request
    Cancelled,
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PlanStatus::Pending),
            "running" => Ok(PlanStatus::Running),
            "paused" => Ok(PlanStatus::Paused),
            "completed" => Ok(PlanStatus::Completed),
            "failed" => Ok(PlanStatus::Failed),
            "cancelled" | "canceled" => Ok(PlanStatus::Cancelled),
            _ => Err(format!("Invalid plan status: {s}")),
        }
    }
}

impl PlanStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Running => "running",
            PlanStatus::Paused => "paused",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the plan has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

/// Type-safe enumeration of step statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting for its dependencies or for the plan to start
    #[default]
    Pending,

    /// Dependencies settled, queued in the current wave
    Ready,

    /// Dispatched to an agent
    Running,

    /// Finished with an accepted result
    Completed,

    /// Finished with a final failed result
    Failed,

    /// Will never run
    Skipped,

    /// Left undispatched because the plan paused mid-wave
    Paused,
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StepStatus::Pending),
            "ready" => Ok(StepStatus::Ready),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            "paused" => Ok(StepStatus::Paused),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl StepStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Paused => "paused",
        }
    }

    /// Terminal statuses count towards plan progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Get status with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cadence_core::models::StepStatus;
    ///
    /// assert_eq!(StepStatus::Completed.with_icon(), "✓ Completed");
    /// assert_eq!(StepStatus::Failed.with_icon(), "✗ Failed");
    /// assert_eq!(StepStatus::Pending.with_icon(), "○ Pending");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "○ Pending",
            StepStatus::Ready => "◇ Ready",
            StepStatus::Running => "➤ Running",
            StepStatus::Completed => "✓ Completed",
            StepStatus::Failed => "✗ Failed",
            StepStatus::Skipped => "↷ Skipped",
            StepStatus::Paused => "‖ Paused",
        }
    }
}

/// Outcome classification reported on a [`super::StepResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Success,
    Partial,
    Failed,
}

impl FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(ResultStatus::Success),
            "partial" => Ok(ResultStatus::Partial),
            "failed" => Ok(ResultStatus::Failed),
            _ => Err(format!("Invalid result status: {s}")),
        }
    }
}

impl ResultStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Partial => "partial",
            ResultStatus::Failed => "failed",
        }
    }
}

/// How a plan reacts when a step fails after exhausting its retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip every step that has not run yet and fail the plan
    #[default]
    AbortOnFailure,

    /// Skip the failed step's dependents and keep going
    SkipDependents,

    /// Run dependents with an absence marker for the failed step's output
    ContinueWithPartialInput,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "abort_on_failure" | "abort" => Ok(FailurePolicy::AbortOnFailure),
            "skip_dependents" | "skip" => Ok(FailurePolicy::SkipDependents),
            "continue_with_partial_input" | "continue" => {
                Ok(FailurePolicy::ContinueWithPartialInput)
            }
            _ => Err(format!("Invalid failure policy: {s}")),
        }
    }
}

impl FailurePolicy {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::AbortOnFailure => "abort_on_failure",
            FailurePolicy::SkipDependents => "skip_dependents",
            FailurePolicy::ContinueWithPartialInput => "continue_with_partial_input",
        }
    }

    /// Whether a failed step ends the whole plan.
    pub fn aborts(&self) -> bool {
        matches!(self, FailurePolicy::AbortOnFailure)
    }
}
