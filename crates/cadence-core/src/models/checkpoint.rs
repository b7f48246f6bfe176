//! Checkpoint model definition.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Plan, PlanId};

/// Per-plan checkpoint sequence number, doubling as the checkpoint id.
pub type CheckpointId = u64;

/// Immutable snapshot of a plan, its steps and their results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Plan the snapshot belongs to
    pub plan_id: PlanId,

    /// Monotonically increasing per plan, starting at 1
    pub sequence_number: CheckpointId,

    /// Deep copy of the plan at the time of the save
    pub snapshot: Plan,

    /// Timestamp when the checkpoint was written (UTC)
    pub created_at: Timestamp,
}

impl Checkpoint {
    /// Captures `plan` as checkpoint number `sequence_number`.
    pub fn capture(plan: &Plan, sequence_number: CheckpointId) -> Self {
        Self {
            plan_id: plan.id.clone(),
            sequence_number,
            snapshot: plan.clone(),
            created_at: Timestamp::now(),
        }
    }
}
