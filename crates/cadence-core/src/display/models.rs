//! Display implementations for domain models.
//!
//! Statuses render as their lowercase storage names so they can be embedded in
//! error messages and logs. Plans, steps and reports render as markdown for
//! the terminal.

use std::fmt;

use super::datetime::LocalDateTime;
use crate::models::{
    FailurePolicy, Plan, PlanReport, PlanStatus, ResultStatus, Step, StepResult, StepStatus,
};

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.goal)?;
        writeln!(f)?;

        writeln!(f, "- ID: {}", self.id)?;
        writeln!(f, "- Status: {}", self.status)?;
        writeln!(f, "- Failure policy: {}", self.failure_policy)?;
        writeln!(f, "- Progress: {:.1}%", self.progress_percentage())?;
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Updated: {}", LocalDateTime(&self.updated_at))?;

        if self.steps.is_empty() {
            writeln!(f, "\nNo steps in this plan.")?;
            return Ok(());
        }

        writeln!(f, "\n## Steps")?;
        writeln!(f)?;
        for step in &self.steps {
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### {}. {} ({})",
            self.sequence_index,
            self.id,
            self.status.with_icon()
        )?;
        writeln!(f)?;

        if !self.description.is_empty() {
            writeln!(f, "{}", self.description)?;
            writeln!(f)?;
        }

        writeln!(f, "- Capability: `{}`", self.required_capability)?;
        if !self.dependencies.is_empty() {
            let deps: Vec<&str> = self.dependencies.iter().map(|d| d.as_str()).collect();
            writeln!(f, "- Depends on: {}", deps.join(", "))?;
        }
        if self.retry_count > 0 {
            writeln!(f, "- Retries: {}", self.retry_count)?;
        }
        writeln!(f)?;

        if let Some(result) = &self.result {
            writeln!(f, "#### Result")?;
            writeln!(f)?;
            write!(f, "{result}")?;
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "- Status: {} (confidence {:.2}, quality {:.2}, {}ms)",
            self.status, self.confidence_score, self.quality_score, self.execution_time_ms
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "- Error: {error}")?;
        }
        if !self.output.is_null() {
            writeln!(f, "- Output: `{}`", self.output)?;
        }
        for source in &self.sources {
            writeln!(f, "- Source: {source}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## {} ({})", self.goal, self.plan_id)?;
        writeln!(f)?;
        writeln!(f, "- **Status**: {}", self.status)?;
        writeln!(
            f,
            "- **Progress**: {:.1}% ({}/{} steps)",
            self.progress_percentage,
            self.counts.terminal(),
            self.counts.total
        )?;
        writeln!(
            f,
            "- **Completed**: {}, **Failed**: {}, **Skipped**: {}",
            self.counts.completed, self.counts.failed, self.counts.skipped
        )?;
        writeln!(f, "- **Updated**: {}", LocalDateTime(&self.updated_at))?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "### Failures")?;
            writeln!(f)?;
            for failure in &self.failures {
                writeln!(f, "- `{}`: {}", failure.step_id, failure.reason)?;
            }
        }
        writeln!(f)?;
        Ok(())
    }
}
