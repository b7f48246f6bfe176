//! Run report types.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Plan, PlanId, PlanStatus, StepCounts, StepId, StepStatus};

/// A failed step and its final error reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: StepId,
    pub reason: String,
}

/// Outcome of a plan run as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    /// Plan ID
    pub plan_id: PlanId,
    /// Goal of the plan
    pub goal: String,
    /// Plan status at the time of the report
    pub status: PlanStatus,
    /// Derived progress in percent
    pub progress_percentage: f64,
    /// Step counts by status bucket
    pub counts: StepCounts,
    /// Failing steps with their final reasons
    pub failures: Vec<StepFailure>,
    /// Last update timestamp
    pub updated_at: Timestamp,
}

impl PlanReport {
    /// Whether the plan finished without a blocking failure.
    pub fn succeeded(&self) -> bool {
        self.status == PlanStatus::Completed
    }
}

impl From<&Plan> for PlanReport {
    fn from(plan: &Plan) -> Self {
        let failures = plan
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .map(|step| StepFailure {
                step_id: step.id.clone(),
                reason: step
                    .result
                    .as_ref()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        Self {
            plan_id: plan.id.clone(),
            goal: plan.goal.clone(),
            status: plan.status,
            progress_percentage: plan.progress_percentage(),
            counts: plan.counts(),
            failures,
            updated_at: plan.updated_at,
        }
    }
}
