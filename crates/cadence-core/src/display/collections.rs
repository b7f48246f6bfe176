//! Collection wrapper types for displaying groups of domain objects.

use std::fmt;

use super::datetime::LocalDateTime;
use crate::models::{Checkpoint, PlanReport, Step};

/// Newtype wrapper for displaying collections of steps.
///
/// # Examples
///
/// ```rust
/// use cadence_core::{display::Steps, models::Step};
///
/// let steps = Steps(vec![Step::new("fetch", "search")]);
/// assert!(steps.to_string().contains("fetch"));
/// assert_eq!(Steps(vec![]).to_string(), "No steps found.\n");
/// ```
pub struct Steps(pub Vec<Step>);

impl Steps {
    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of steps in the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No steps found.");
        }
        for step in &self.0 {
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

/// Newtype wrapper for displaying one report per known plan.
pub struct PlanReports(pub Vec<PlanReport>);

impl PlanReports {
    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of reports in the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for PlanReports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No plans found.");
        }
        for report in &self.0 {
            write!(f, "{report}")?;
        }
        Ok(())
    }
}

/// Checkpoint history of one plan, oldest first.
pub struct CheckpointHistory(pub Vec<Checkpoint>);

impl fmt::Display for CheckpointHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No checkpoints found.");
        }

        writeln!(f, "| # | Status | Progress | Created |")?;
        writeln!(f, "|---|--------|----------|---------|")?;
        for checkpoint in &self.0 {
            writeln!(
                f,
                "| {} | {} | {:.1}% | {} |",
                checkpoint.sequence_number,
                checkpoint.snapshot.status,
                checkpoint.snapshot.progress_percentage(),
                LocalDateTime(&checkpoint.created_at)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Plan;

    #[test]
    fn test_checkpoint_history_table() {
        let plan = Plan::new("goal").with_step(Step::new("a", "cap"));
        let history = CheckpointHistory(vec![
            Checkpoint::capture(&plan, 1),
            Checkpoint::capture(&plan, 2),
        ]);

        let output = history.to_string();
        assert!(output.contains("| 1 | pending | 0.0% |"));
        assert!(output.contains("| 2 | pending | 0.0% |"));
    }

    #[test]
    fn test_empty_collections() {
        assert_eq!(PlanReports(vec![]).to_string(), "No plans found.\n");
        assert_eq!(
            CheckpointHistory(vec![]).to_string(),
            "No checkpoints found.\n"
        );
    }
}
