//! Result wrapper types for displaying the outcome of control operations.

use std::fmt;

use crate::models::{CheckpointId, Plan, PlanId, StepId};

/// Confirmation of a lifecycle request (pause, resume, cancel, ...).
///
/// # Examples
///
/// ```rust
/// use cadence_core::{display::ControlResult, models::PlanId};
///
/// let result = ControlResult::new(PlanId::from("plan-1"), "paused");
/// assert_eq!(result.to_string(), "Plan plan-1 paused.\n");
/// ```
pub struct ControlResult {
    pub plan_id: PlanId,
    pub action: &'static str,
}

impl ControlResult {
    pub fn new(plan_id: PlanId, action: &'static str) -> Self {
        Self { plan_id, action }
    }
}

impl fmt::Display for ControlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan {} {}.", self.plan_id, self.action)
    }
}

/// Steps skipped by a skip request, the requested step first.
pub struct SkipResult {
    pub plan_id: PlanId,
    pub skipped: Vec<StepId>,
}

impl fmt::Display for SkipResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut skipped = self.skipped.iter();
        match skipped.next() {
            Some(first) => {
                writeln!(f, "Skipped step '{first}' in plan {}.", self.plan_id)?;
                let rest: Vec<&str> = skipped.map(StepId::as_str).collect();
                if !rest.is_empty() {
                    writeln!(f)?;
                    writeln!(f, "Also skipped dependents: {}", rest.join(", "))?;
                }
                Ok(())
            }
            None => writeln!(f, "Nothing skipped in plan {}.", self.plan_id),
        }
    }
}

/// A plan restored from one of its checkpoints.
pub struct RollbackResult {
    pub checkpoint: CheckpointId,
    pub plan: Plan,
}

impl fmt::Display for RollbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rolled plan {} back to checkpoint {}.",
            self.plan.id, self.checkpoint
        )?;
        writeln!(f)?;
        write!(f, "{}", self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_result_lists_dependents() {
        let result = SkipResult {
            plan_id: PlanId::from("p"),
            skipped: vec![StepId::from("a"), StepId::from("b"), StepId::from("c")],
        };
        let output = result.to_string();
        assert!(output.starts_with("Skipped step 'a' in plan p."));
        assert!(output.contains("Also skipped dependents: b, c"));
    }

    #[test]
    fn test_skip_result_single_step() {
        let result = SkipResult {
            plan_id: PlanId::from("p"),
            skipped: vec![StepId::from("a")],
        };
        assert_eq!(result.to_string(), "Skipped step 'a' in plan p.\n");
    }

    #[test]
    fn test_rollback_result_shows_plan() {
        let plan = Plan::new("Restore me").with_id("p");
        let output = RollbackResult { checkpoint: 3, plan }.to_string();
        assert!(output.starts_with("Rolled plan p back to checkpoint 3."));
        assert!(output.contains("# Restore me"));
    }
}
