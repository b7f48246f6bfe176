//! Plan lifecycle operations.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, oneshot, watch, MutexGuard};

use super::{
    driver::{Driver, DriverCommand, Start},
    step_ops::slot_status,
    Inner, PlanOrchestrator, PlanSlot, RunHandle,
};
use crate::{
    error::{OrchestratorError, Result},
    events::PlanEvent,
    executor::cancellation,
    graph::DependencyGraphBuilder,
    models::{CheckpointId, Plan, PlanId, PlanReport, PlanStatus, StepStatus},
};

/// Commands buffered per running plan.
const COMMAND_CAPACITY: usize = 32;

type Slots<'a> = MutexGuard<'a, HashMap<PlanId, PlanSlot>>;

impl PlanOrchestrator {
    /// Validates a plan and registers it as pending without running it.
    ///
    /// Sequence indices are renumbered by position if they are not unique, and
    /// an initial checkpoint is written.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::CyclicDependency` or
    /// `OrchestratorError::Validation` if the step graph is invalid, and
    /// `OrchestratorError::Persistence` if the initial checkpoint fails.
    pub async fn submit(&self, mut plan: Plan) -> Result<PlanId> {
        if plan.status != PlanStatus::Pending {
            return Err(OrchestratorError::InvalidTransition {
                plan_id: plan.id.clone(),
                status: plan.status,
                operation: "submit",
            });
        }
        plan.normalize_sequence();
        for step in &mut plan.steps {
            if matches!(
                step.status,
                StepStatus::Ready | StepStatus::Running | StepStatus::Paused
            ) {
                step.transition(StepStatus::Pending);
            }
        }
        DependencyGraphBuilder::validate(&plan.steps)?;

        let mut plans = self.inner.plans.lock().await;
        if plans.contains_key(&plan.id) {
            return Err(OrchestratorError::validation("id")
                .with_reason(format!("plan {} has already been submitted", plan.id)));
        }

        plan.touch();
        let checkpoint = self.inner.store.save(&plan).await?;
        self.inner.events.publish(PlanEvent::CheckpointSaved {
            plan_id: plan.id.clone(),
            checkpoint,
            progress_percentage: plan.progress_percentage(),
        });

        let plan_id = plan.id.clone();
        log::info!(
            "Submitted plan {plan_id} '{}' with {} step(s)",
            plan.goal,
            plan.steps.len()
        );
        plans.insert(plan_id.clone(), PlanSlot::Idle { plan, halted: None });
        Ok(plan_id)
    }

    /// Submits a plan and starts running it.
    ///
    /// Graph errors are returned before anything runs.
    pub async fn start(&self, plan: Plan) -> Result<PlanId> {
        let plan_id = self.submit(plan).await?;
        self.run(&plan_id).await?;
        Ok(plan_id)
    }

    /// Starts running a submitted, pending plan.
    pub async fn run(&self, plan_id: &PlanId) -> Result<()> {
        let mut plans = self.inner.plans.lock().await;
        let plan = take_idle(&mut plans, plan_id, "run", |plan, _| {
            plan.status == PlanStatus::Pending
        })?;
        self.spawn_driver(&mut plans, plan, Start::Fresh);
        Ok(())
    }

    /// Requests a running plan to pause.
    ///
    /// Steps already dispatched finish; the rest of the current wave is
    /// marked paused. Use [`wait`](Self::wait) to observe the pause.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` if the plan is not
    /// running, including a run that ended before the request reached it.
    pub async fn pause(&self, plan_id: &PlanId) -> Result<()> {
        let commands = self.running_commands(plan_id, "pause").await?;
        self.request(plan_id, &commands, "pause", |reply| DriverCommand::Pause { reply })
            .await
    }

    /// Continues a paused plan from its current state.
    ///
    /// A plan that is not in memory is first recovered from the store. A run
    /// halted by a persistence failure can be resumed as well.
    pub async fn resume(&self, plan_id: &PlanId) -> Result<()> {
        self.ensure_loaded(plan_id).await?;

        let mut plans = self.inner.plans.lock().await;
        let mut plan = take_idle(&mut plans, plan_id, "resume", |plan, halted| {
            plan.status == PlanStatus::Paused
                || (plan.status == PlanStatus::Running && halted)
        })?;
        reset_interrupted(&mut plan, true);
        self.spawn_driver(&mut plans, plan, Start::Resumed);
        Ok(())
    }

    /// Cancels a plan.
    ///
    /// Running steps observe the cancellation before their next attempt or
    /// retry wait; every step without a verdict ends up skipped.
    pub async fn cancel(&self, plan_id: &PlanId) -> Result<()> {
        let mut plans = self.inner.plans.lock().await;
        let running = match plans.get(plan_id) {
            Some(PlanSlot::Running(handle)) => {
                handle.cancel.cancel();
                Some(handle.commands.clone())
            }
            _ => None,
        };

        if let Some(commands) = running {
            drop(plans);
            return self
                .request(plan_id, &commands, "cancel", |reply| DriverCommand::Cancel {
                    reply,
                })
                .await;
        }

        let halted = match plans.get(plan_id) {
            Some(PlanSlot::Idle { halted, .. }) => halted.clone(),
            _ => None,
        };
        let original = take_idle(&mut plans, plan_id, "cancel", |plan, _| {
            !plan.status.is_terminal()
        })?;
        let mut plan = original.clone();
        for step in &mut plan.steps {
            if !step.is_terminal() {
                step.transition(StepStatus::Skipped);
            }
        }
        plan.transition(PlanStatus::Cancelled);

        let plan_id = plan.id.clone();
        if let Err(e) = self.inner.store.save(&plan).await {
            plans.insert(
                plan_id,
                PlanSlot::Idle {
                    plan: original,
                    halted,
                },
            );
            return Err(e);
        }
        plans.insert(plan_id.clone(), PlanSlot::Idle { plan, halted: None });

        log::info!("Plan {plan_id} is cancelled");
        self.inner
            .events
            .publish(PlanEvent::PlanCancelled { plan_id });
        Ok(())
    }

    /// Waits until the plan is no longer running and reports its state.
    ///
    /// # Errors
    ///
    /// Returns the persistence error that halted the run, if any.
    pub async fn wait(&self, plan_id: &PlanId) -> Result<PlanReport> {
        loop {
            let mut finished = {
                let plans = self.inner.plans.lock().await;
                match plans.get(plan_id) {
                    Some(PlanSlot::Idle { plan, halted }) => {
                        return match halted {
                            Some(message) => Err(OrchestratorError::persistence(format!(
                                "plan {plan_id} halted: {message}"
                            ))
                            .build()),
                            None => Ok(PlanReport::from(plan)),
                        };
                    }
                    Some(PlanSlot::Running(handle)) => handle.finished.clone(),
                    None => {
                        return Err(OrchestratorError::PlanNotFound {
                            id: plan_id.clone(),
                        })
                    }
                }
            };
            if finished.wait_for(|done| *done).await.is_err() {
                let plans = self.inner.plans.lock().await;
                if let Some(PlanSlot::Running(_)) = plans.get(plan_id) {
                    return Err(OrchestratorError::persistence(format!(
                        "driver of plan {plan_id} stopped without settling"
                    ))
                    .build());
                }
            }
        }
    }

    /// Current state of a plan, including a running one.
    pub async fn plan(&self, plan_id: &PlanId) -> Result<Plan> {
        let plans = self.inner.plans.lock().await;
        match plans.get(plan_id) {
            Some(PlanSlot::Idle { plan, .. }) => Ok(plan.clone()),
            Some(PlanSlot::Running(handle)) => Ok(handle.snapshot.borrow().clone()),
            None => Err(OrchestratorError::PlanNotFound {
                id: plan_id.clone(),
            }),
        }
    }

    /// Outcome summary of a plan in its current state.
    pub async fn report(&self, plan_id: &PlanId) -> Result<PlanReport> {
        self.plan(plan_id).await.map(|plan| PlanReport::from(&plan))
    }

    /// Identifiers of the plans held in memory.
    pub async fn plan_ids(&self) -> Vec<PlanId> {
        let plans = self.inner.plans.lock().await;
        let mut ids: Vec<PlanId> = plans.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Checkpoint ids stored for a plan.
    pub async fn checkpoints(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        self.inner.store.list(plan_id).await
    }

    /// Loads a plan from the store after a restart.
    ///
    /// Steps that were running or ready when the process stopped are reset to
    /// pending, and a plan that was running becomes paused so it can be
    /// resumed. A plan already in memory is returned as is.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::PlanNotFound` if the store has no such
    /// plan and `OrchestratorError::InvalidTransition` if it is running here.
    pub async fn recover(&self, plan_id: &PlanId) -> Result<Plan> {
        let mut plans = self.inner.plans.lock().await;
        match plans.get(plan_id) {
            Some(PlanSlot::Idle { plan, .. }) => return Ok(plan.clone()),
            Some(slot) => {
                return Err(OrchestratorError::InvalidTransition {
                    plan_id: plan_id.clone(),
                    status: slot_status(slot),
                    operation: "recover",
                })
            }
            None => {}
        }

        let mut plan = self.inner.store.load(plan_id).await?.ok_or_else(|| {
            OrchestratorError::PlanNotFound {
                id: plan_id.clone(),
            }
        })?;
        reset_interrupted(&mut plan, false);
        if plan.status == PlanStatus::Running {
            plan.transition(PlanStatus::Paused);
        }

        log::info!(
            "Recovered plan {plan_id} ({}, {:.1}% done)",
            plan.status,
            plan.progress_percentage()
        );
        plans.insert(
            plan_id.clone(),
            PlanSlot::Idle {
                plan: plan.clone(),
                halted: None,
            },
        );
        Ok(plan)
    }

    /// Replaces a plan's state with the snapshot held by a checkpoint.
    ///
    /// Steps that were in flight in the snapshot are reset to pending. The
    /// plan becomes paused (pending if it had never run) and a new checkpoint
    /// recording the rollback is appended; [`resume`](Self::resume) continues
    /// from there.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` while the plan runs and
    /// `OrchestratorError::CheckpointNotFound` for an unknown checkpoint.
    pub async fn rollback_to_checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<()> {
        self.ensure_loaded(plan_id).await?;

        let mut plans = self.inner.plans.lock().await;
        if let Some(slot) = plans
            .get(plan_id)
            .filter(|slot| matches!(slot, PlanSlot::Running(_)))
        {
            return Err(OrchestratorError::InvalidTransition {
                plan_id: plan_id.clone(),
                status: slot_status(slot),
                operation: "roll back",
            });
        }

        let mut plan = self.inner.store.restore(plan_id, checkpoint_id).await?;
        reset_interrupted(&mut plan, true);
        let status = if plan.status == PlanStatus::Pending {
            PlanStatus::Pending
        } else {
            PlanStatus::Paused
        };
        plan.transition(status);

        let checkpoint = self.inner.store.save(&plan).await?;
        log::info!("Plan {plan_id} rolled back to checkpoint {checkpoint_id}");
        self.inner.events.publish(PlanEvent::CheckpointSaved {
            plan_id: plan_id.clone(),
            checkpoint,
            progress_percentage: plan.progress_percentage(),
        });
        plans.insert(plan_id.clone(), PlanSlot::Idle { plan, halted: None });
        Ok(())
    }

    async fn ensure_loaded(&self, plan_id: &PlanId) -> Result<()> {
        let known = self.inner.plans.lock().await.contains_key(plan_id);
        if !known {
            self.recover(plan_id).await?;
        }
        Ok(())
    }

    async fn running_commands(
        &self,
        plan_id: &PlanId,
        operation: &'static str,
    ) -> Result<mpsc::Sender<DriverCommand>> {
        let plans = self.inner.plans.lock().await;
        match plans.get(plan_id) {
            Some(PlanSlot::Running(handle)) => Ok(handle.commands.clone()),
            Some(slot) => Err(OrchestratorError::InvalidTransition {
                plan_id: plan_id.clone(),
                status: slot_status(slot),
                operation,
            }),
            None => Err(OrchestratorError::PlanNotFound {
                id: plan_id.clone(),
            }),
        }
    }

    /// Sends a control command and waits for the driver to take it.
    async fn request(
        &self,
        plan_id: &PlanId,
        commands: &mpsc::Sender<DriverCommand>,
        operation: &'static str,
        command: impl FnOnce(oneshot::Sender<()>) -> DriverCommand,
    ) -> Result<()> {
        let (reply, accepted) = oneshot::channel();
        if commands.send(command(reply)).await.is_err() || accepted.await.is_err() {
            return Err(self.not_running(plan_id, operation).await);
        }
        Ok(())
    }

    /// Error for a command that reached a driver after its run ended.
    pub(super) async fn not_running(
        &self,
        plan_id: &PlanId,
        operation: &'static str,
    ) -> OrchestratorError {
        let status = match self.plan(plan_id).await {
            Ok(plan) => plan.status,
            Err(e) => return e,
        };
        OrchestratorError::InvalidTransition {
            plan_id: plan_id.clone(),
            status,
            operation,
        }
    }

    /// Hands `plan` to a new driver task and records it as running.
    fn spawn_driver(&self, plans: &mut Slots<'_>, plan: Plan, start: Start) {
        let plan_id = plan.id.clone();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (cancel, token) = cancellation();
        let (snapshot_tx, snapshot_rx) = watch::channel(plan.clone());
        let (finished_tx, finished_rx) = watch::channel(false);

        let driver = Driver::new(
            plan,
            self.inner.executor.clone(),
            Arc::clone(&self.inner.store),
            self.inner.events.clone(),
            self.inner.max_concurrency,
            commands_rx,
            token,
            snapshot_tx,
        );

        plans.insert(
            plan_id.clone(),
            PlanSlot::Running(RunHandle {
                commands: commands_tx,
                cancel,
                snapshot: snapshot_rx,
                finished: finished_rx,
            }),
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let (plan, error) = driver.run(start).await;
            inner.settle(plan, error).await;
            finished_tx.send_replace(true);
        });
    }
}

impl Inner {
    /// Returns a plan from its driver into the idle slot.
    async fn settle(&self, plan: Plan, error: Option<OrchestratorError>) {
        let mut plans = self.plans.lock().await;
        plans.insert(
            plan.id.clone(),
            PlanSlot::Idle {
                plan,
                halted: error.map(|e| e.to_string()),
            },
        );
    }
}

/// Removes an idle plan from its slot if `allowed` accepts it.
///
/// The caller must put the plan back (or replace the slot).
fn take_idle(
    plans: &mut Slots<'_>,
    plan_id: &PlanId,
    operation: &'static str,
    allowed: impl Fn(&Plan, bool) -> bool,
) -> Result<Plan> {
    match plans.get(plan_id) {
        Some(PlanSlot::Idle { plan, halted }) if allowed(plan, halted.is_some()) => {}
        Some(slot) => {
            return Err(OrchestratorError::InvalidTransition {
                plan_id: plan_id.clone(),
                status: slot_status(slot),
                operation,
            })
        }
        None => {
            return Err(OrchestratorError::PlanNotFound {
                id: plan_id.clone(),
            })
        }
    }

    match plans.remove(plan_id) {
        Some(PlanSlot::Idle { plan, .. }) => Ok(plan),
        _ => Err(OrchestratorError::PlanNotFound {
            id: plan_id.clone(),
        }),
    }
}

/// Returns steps caught mid-flight to pending. Paused steps are reset too
/// when `include_paused` is set.
pub(super) fn reset_interrupted(plan: &mut Plan, include_paused: bool) {
    for step in &mut plan.steps {
        let interrupted = match step.status {
            StepStatus::Ready | StepStatus::Running => true,
            StepStatus::Paused => include_paused,
            _ => false,
        };
        if interrupted {
            step.transition(StepStatus::Pending);
        }
    }
}
