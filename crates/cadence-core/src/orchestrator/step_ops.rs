//! Step mutations: adding steps to idle plans and skipping steps.

use tokio::sync::oneshot;

use super::{driver::DriverCommand, PlanOrchestrator, PlanSlot};
use crate::{
    error::{OrchestratorError, Result},
    events::PlanEvent,
    graph::DependencyGraphBuilder,
    models::{Plan, PlanId, PlanStatus, Step, StepId, StepStatus},
};

impl PlanOrchestrator {
    /// Adds a step to a pending or paused plan.
    ///
    /// The step receives the next sequence index and is inserted right after
    /// `insert_after`, or appended when `None`. Every dependency it declares
    /// must already exist in the plan.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` unless the plan is
    /// pending or paused, `OrchestratorError::Validation` for a duplicate id or
    /// an unknown dependency, and `OrchestratorError::StepNotFound` if
    /// `insert_after` does not exist.
    pub async fn add_step(
        &self,
        plan_id: &PlanId,
        step: Step,
        insert_after: Option<&StepId>,
    ) -> Result<()> {
        let mut plans = self.inner.plans.lock().await;
        let (mut plan, halted) = match plans.get(plan_id) {
            Some(PlanSlot::Idle { plan, halted })
                if matches!(plan.status, PlanStatus::Pending | PlanStatus::Paused) =>
            {
                (plan.clone(), halted.clone())
            }
            Some(slot) => {
                return Err(OrchestratorError::InvalidTransition {
                    plan_id: plan_id.clone(),
                    status: slot_status(slot),
                    operation: "add a step to",
                })
            }
            None => {
                return Err(OrchestratorError::PlanNotFound {
                    id: plan_id.clone(),
                })
            }
        };

        insert_step(&mut plan, step, insert_after)?;
        plan.touch();

        let checkpoint = self.inner.store.save(&plan).await?;
        self.inner.events.publish(PlanEvent::CheckpointSaved {
            plan_id: plan.id.clone(),
            checkpoint,
            progress_percentage: plan.progress_percentage(),
        });
        plans.insert(plan_id.clone(), PlanSlot::Idle { plan, halted });
        Ok(())
    }

    /// Skips a step that has not started yet, cascading to every step that
    /// transitively depends on it. Returns the ids of all skipped steps, the
    /// requested one first.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Validation` if the step is running or
    /// already terminal, and `OrchestratorError::InvalidTransition` if the
    /// plan has finished.
    pub async fn skip_step(&self, plan_id: &PlanId, step_id: &StepId) -> Result<Vec<StepId>> {
        let mut plans = self.inner.plans.lock().await;
        let commands = match plans.get(plan_id) {
            Some(PlanSlot::Running(handle)) => Some(handle.commands.clone()),
            _ => None,
        };

        if let Some(commands) = commands {
            drop(plans);
            let (reply, response) = oneshot::channel();
            let command = DriverCommand::Skip {
                step_id: step_id.clone(),
                reply,
            };
            if commands.send(command).await.is_err() {
                return Err(self.not_running(plan_id, "skip a step in").await);
            }
            return match response.await {
                Ok(skipped) => skipped,
                Err(_) => Err(self.not_running(plan_id, "skip a step in").await),
            };
        }

        // A run halted by a failed checkpoint stays resumable after the skip.
        let (mut plan, halted) = match plans.get(plan_id) {
            Some(PlanSlot::Idle { plan, halted }) if !plan.status.is_terminal() => {
                (plan.clone(), halted.clone())
            }
            Some(slot) => {
                return Err(OrchestratorError::InvalidTransition {
                    plan_id: plan_id.clone(),
                    status: slot_status(slot),
                    operation: "skip a step in",
                })
            }
            None => {
                return Err(OrchestratorError::PlanNotFound {
                    id: plan_id.clone(),
                })
            }
        };

        let skipped = skip_cascade(&mut plan, step_id)?;
        plan.touch();
        self.inner.store.save(&plan).await?;
        plans.insert(plan_id.clone(), PlanSlot::Idle { plan, halted });
        Ok(skipped)
    }
}

/// Validates and inserts a new step.
pub(super) fn insert_step(
    plan: &mut Plan,
    mut step: Step,
    insert_after: Option<&StepId>,
) -> Result<()> {
    if plan.step(&step.id).is_some() {
        return Err(OrchestratorError::validation("id")
            .with_reason(format!("step '{}' already exists", step.id)));
    }
    if let Some(missing) = step
        .dependencies
        .iter()
        .find(|dep| plan.step(dep).is_none())
    {
        return Err(OrchestratorError::validation("dependencies").with_reason(format!(
            "step '{}' depends on unknown step '{missing}'",
            step.id
        )));
    }

    let position = match insert_after {
        Some(after) => {
            plan.steps
                .iter()
                .position(|s| &s.id == after)
                .ok_or_else(|| OrchestratorError::StepNotFound {
                    plan_id: plan.id.clone(),
                    id: after.clone(),
                })?
                + 1
        }
        None => plan.steps.len(),
    };

    step.sequence_index = plan.next_sequence_index();
    step.retry_count = 0;
    step.result = None;
    step.transition(StepStatus::Pending);

    log::debug!(
        "Adding step '{}' to plan {} at position {position}",
        step.id,
        plan.id
    );
    plan.steps.insert(position, step);
    DependencyGraphBuilder::validate(&plan.steps)
}

/// Skips `step_id` and every not-yet-started dependent.
pub(super) fn skip_cascade(plan: &mut Plan, step_id: &StepId) -> Result<Vec<StepId>> {
    let plan_id = plan.id.clone();
    let step = plan
        .step_mut(step_id)
        .ok_or_else(|| OrchestratorError::StepNotFound {
            plan_id,
            id: step_id.clone(),
        })?;
    if step.has_started() {
        return Err(OrchestratorError::validation("step_id").with_reason(format!(
            "step '{step_id}' is {} and can no longer be skipped",
            step.status
        )));
    }
    step.transition(StepStatus::Skipped);

    let mut skipped = vec![step_id.clone()];
    skipped.extend(skip_dependents(plan, step_id));
    log::info!("Skipped step '{step_id}' and {} dependent(s)", skipped.len() - 1);
    Ok(skipped)
}

/// Skips every transitive dependent of `step_id` that has not started.
pub(super) fn skip_dependents(plan: &mut Plan, step_id: &StepId) -> Vec<StepId> {
    let mut skipped = Vec::new();
    for dependent in plan.dependents_of(step_id) {
        if let Some(step) = plan.step_mut(&dependent) {
            if !step.has_started() {
                step.transition(StepStatus::Skipped);
                skipped.push(dependent);
            }
        }
    }
    skipped
}

pub(super) fn slot_status(slot: &PlanSlot) -> PlanStatus {
    match slot {
        PlanSlot::Idle { plan, .. } => plan.status,
        PlanSlot::Running(handle) => handle.snapshot.borrow().status,
    }
}
