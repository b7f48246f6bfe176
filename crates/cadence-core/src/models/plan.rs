//! Plan model definition and related functionality.

use std::collections::{BTreeSet, VecDeque};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{
    DependencyOutput, FailurePolicy, PlanId, PlanStatus, Step, StepContext, StepId, StepStatus,
};

/// Represents a complete plan with metadata and its owned steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique identifier for the plan
    #[serde(default = "PlanId::generate")]
    pub id: PlanId,

    /// What the plan is meant to achieve
    pub goal: String,

    /// Lifecycle status of the plan
    #[serde(default)]
    pub status: PlanStatus,

    /// Reaction to an unrecoverable step failure
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Timestamp when the plan was created (UTC)
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,

    /// Timestamp when the plan was last modified (UTC)
    #[serde(default = "Timestamp::now")]
    pub updated_at: Timestamp,

    /// Steps in insertion order
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Step counts grouped by status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Everything that is not terminal yet
    pub pending: usize,
}

impl StepCounts {
    /// Number of steps in a terminal status.
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

impl Plan {
    /// Creates a pending plan with a generated identifier.
    pub fn new(goal: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: PlanId::generate(),
            goal: goal.into(),
            status: PlanStatus::Pending,
            failure_policy: FailurePolicy::default(),
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        }
    }

    /// Replaces the generated identifier.
    pub fn with_id(mut self, id: impl Into<PlanId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Appends a step, assigning the next sequence index.
    pub fn with_step(mut self, step: Step) -> Self {
        self.push_step(step);
        self
    }

    /// Appends a step, assigning the next sequence index.
    pub fn push_step(&mut self, mut step: Step) {
        step.sequence_index = self.next_sequence_index();
        self.steps.push(step);
    }

    /// Reassigns sequence indices by position when they are not unique, as
    /// happens for plans deserialized without explicit indices.
    pub fn normalize_sequence(&mut self) {
        let distinct: BTreeSet<u32> = self.steps.iter().map(|s| s.sequence_index).collect();
        if distinct.len() != self.steps.len() {
            for (index, step) in self.steps.iter_mut().enumerate() {
                step.sequence_index = index as u32;
            }
        }
    }

    /// The sequence index the next added step receives.
    pub fn next_sequence_index(&self) -> u32 {
        self.steps
            .iter()
            .map(|s| s.sequence_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Looks up a step by id.
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Looks up a step by id for mutation.
    pub fn step_mut(&mut self, id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == id)
    }

    /// Counts steps per status bucket.
    pub fn counts(&self) -> StepCounts {
        self.steps
            .iter()
            .fold(StepCounts::default(), |mut counts, step| {
                counts.total += 1;
                match step.status {
                    StepStatus::Completed => counts.completed += 1,
                    StepStatus::Failed => counts.failed += 1,
                    StepStatus::Skipped => counts.skipped += 1,
                    _ => counts.pending += 1,
                }
                counts
            })
    }

    /// Share of steps in a terminal status, in percent.
    ///
    /// A plan without steps has nothing left to do and reports 100.
    pub fn progress_percentage(&self) -> f64 {
        let counts = self.counts();
        if counts.total == 0 {
            return 100.0;
        }
        100.0 * counts.terminal() as f64 / counts.total as f64
    }

    /// Whether every step is terminal.
    pub fn is_settled(&self) -> bool {
        self.steps.iter().all(Step::is_terminal)
    }

    /// Every step that transitively depends on `id`, in declaration order.
    pub fn dependents_of(&self, id: &StepId) -> Vec<StepId> {
        let mut found: BTreeSet<StepId> = BTreeSet::new();
        let mut queue: VecDeque<&StepId> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for step in &self.steps {
                if step.dependencies.contains(current) && found.insert(step.id.clone()) {
                    queue.push_back(&step.id);
                }
            }
        }

        self.steps
            .iter()
            .filter(|s| found.contains(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Assembles the dependency outputs a step receives.
    ///
    /// Completed dependencies contribute their output; every other dependency
    /// contributes an explicit absence marker.
    pub fn context_for(&self, step: &Step) -> StepContext {
        step.dependencies
            .iter()
            .map(|dep_id| {
                let value = match self.step(dep_id) {
                    Some(dep) if dep.status == StepStatus::Completed => match &dep.result {
                        Some(result) => DependencyOutput::Available {
                            output: result.output.clone(),
                        },
                        None => DependencyOutput::Absent {
                            reason: format!("step '{dep_id}' completed without a result"),
                        },
                    },
                    Some(dep) => DependencyOutput::Absent {
                        reason: match dep.result.as_ref().and_then(|r| r.error.as_deref()) {
                            Some(error) => format!("step '{dep_id}' {}: {error}", dep.status),
                            None => format!("step '{dep_id}' {}", dep.status),
                        },
                    },
                    None => DependencyOutput::Absent {
                        reason: format!("step '{dep_id}' does not exist"),
                    },
                };
                (dep_id.clone(), value)
            })
            .collect()
    }

    /// Moves the plan to a new status and refreshes its timestamp.
    pub(crate) fn transition(&mut self, status: PlanStatus) {
        self.status = status;
        self.touch();
    }

    /// Refreshes the modification timestamp.
    pub(crate) fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
