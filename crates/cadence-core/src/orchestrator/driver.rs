//! The per-run wave loop.
//!
//! A [`Driver`] owns its plan for the duration of a run. It dispatches the
//! ready steps of each wave onto a `JoinSet`, applies every outcome as it
//! arrives and answers control commands in between. A step that settles while
//! its siblings are still in flight is checkpointed right away; the settled
//! wave is checkpointed before the next one starts.

use std::{collections::VecDeque, sync::Arc};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinSet,
};

use super::step_ops::{skip_cascade, skip_dependents};
use crate::{
    error::{OrchestratorError, Result},
    events::{EventBus, PlanEvent},
    executor::{CancelToken, StepExecutor, StepOutcome},
    graph::{DependencyGraphBuilder, Wave},
    models::{FailurePolicy, Plan, PlanStatus, StepId, StepResult, StepStatus},
    store::CheckpointStore,
};

/// Control requests delivered to a running driver.
/// Every command carries a reply sender; a dropped sender means the run
/// ended before the command was read.
pub(super) enum DriverCommand {
    Pause {
        reply: oneshot::Sender<()>,
    },
    Cancel {
        reply: oneshot::Sender<()>,
    },
    Skip {
        step_id: StepId,
        reply: oneshot::Sender<Result<Vec<StepId>>>,
    },
}

/// Why dispatch stopped early. Later variants take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Halt {
    Pause,
    Abort,
    Cancel,
}

/// How the run was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Start {
    Fresh,
    Resumed,
}

pub(super) struct Driver {
    plan: Plan,
    executor: StepExecutor,
    store: Arc<dyn CheckpointStore>,
    events: EventBus,
    max_concurrency: usize,
    commands: mpsc::Receiver<DriverCommand>,
    cancel: CancelToken,
    snapshot: watch::Sender<Plan>,
    halt: Option<Halt>,
    failures: Vec<StepId>,
    /// A checkpoint written mid-wave failed; the wave drains and the run halts.
    save_error: Option<OrchestratorError>,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        plan: Plan,
        executor: StepExecutor,
        store: Arc<dyn CheckpointStore>,
        events: EventBus,
        max_concurrency: usize,
        commands: mpsc::Receiver<DriverCommand>,
        cancel: CancelToken,
        snapshot: watch::Sender<Plan>,
    ) -> Self {
        Self {
            plan,
            executor,
            store,
            events,
            max_concurrency,
            commands,
            cancel,
            snapshot,
            halt: None,
            failures: Vec::new(),
            save_error: None,
        }
    }

    /// Runs the plan until it settles, pauses, is cancelled or a checkpoint
    /// cannot be written. Returns the plan and the halting error, if any.
    pub(super) async fn run(mut self, start: Start) -> (Plan, Option<OrchestratorError>) {
        let plan_id = self.plan.id.clone();
        self.plan.transition(PlanStatus::Running);
        self.publish_snapshot();

        match start {
            Start::Fresh => {
                log::info!("Starting plan {plan_id} ({} steps)", self.plan.steps.len());
                self.events.publish(PlanEvent::PlanStarted {
                    plan_id: plan_id.clone(),
                    total_steps: self.plan.steps.len(),
                });
            }
            Start::Resumed => {
                log::info!("Resuming plan {plan_id}");
                self.events.publish(PlanEvent::PlanResumed {
                    plan_id: plan_id.clone(),
                });
            }
        }

        // Failures carried over from an earlier run still count.
        self.failures = self
            .plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.id.clone())
            .collect();
        if !self.failures.is_empty() && self.plan.failure_policy.aborts() {
            self.request_halt(Halt::Abort);
        }

        let waves = match DependencyGraphBuilder::remaining(&self.plan.steps) {
            Ok(waves) => waves,
            Err(e) => return self.halted(e),
        };

        let mut waves = waves.into_iter().peekable();
        while let Some(wave) = waves.next() {
            self.drain_commands();
            if self.halt.is_some() {
                break;
            }
            let ran = self.run_wave(wave).await;
            if let Some(e) = self.save_error.take() {
                return self.halted(e);
            }
            if self.halt.is_some() || waves.peek().is_none() {
                break;
            }
            if ran {
                if let Err(e) = self.save_checkpoint().await {
                    return self.halted(e);
                }
            }
        }

        self.finish().await
    }

    /// Dispatches one wave and waits until every dispatched step settled.
    /// Returns whether anything was dispatched.
    async fn run_wave(&mut self, wave: Wave) -> bool {
        let members: Vec<StepId> = wave
            .steps
            .into_iter()
            .filter(|id| self.plan.step(id).is_some_and(|s| !s.is_terminal()))
            .collect();
        if members.is_empty() {
            return false;
        }

        for id in &members {
            if let Some(step) = self.plan.step_mut(id) {
                step.transition(StepStatus::Ready);
            }
        }
        log::info!(
            "Plan {} wave {}: {} step(s)",
            self.plan.id,
            wave.index,
            members.len()
        );
        self.events.publish(PlanEvent::WaveStarted {
            plan_id: self.plan.id.clone(),
            wave: wave.index,
            steps: members.clone(),
        });

        let mut queue = VecDeque::from(members);
        let mut inflight: JoinSet<StepOutcome> = JoinSet::new();

        loop {
            if self.halt.is_none() && self.save_error.is_none() {
                while inflight.len() < self.max_concurrency {
                    let Some(id) = queue.pop_front() else {
                        break;
                    };
                    self.dispatch(&id, &mut inflight);
                }
            }
            self.publish_snapshot();

            if inflight.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = inflight.join_next() => {
                    match joined {
                        Ok(outcome) => {
                            self.apply(outcome);
                            let settling = inflight.is_empty()
                                && (queue.is_empty() || self.halt.is_some());
                            if !settling {
                                self.persist_outcome().await;
                            }
                        }
                        Err(e) => log::error!("Step task of plan {} was lost: {e}", self.plan.id),
                    }
                }
                Some(command) = self.commands.recv() => self.handle(command),
            }
        }

        if self.halt == Some(Halt::Pause) {
            for id in queue {
                if let Some(step) = self.plan.step_mut(&id) {
                    if step.status == StepStatus::Ready {
                        step.transition(StepStatus::Paused);
                    }
                }
            }
        }
        self.publish_snapshot();
        true
    }

    fn dispatch(&mut self, id: &StepId, inflight: &mut JoinSet<StepOutcome>) {
        let step = match self.plan.step_mut(id) {
            Some(step) if step.status == StepStatus::Ready => {
                step.transition(StepStatus::Running);
                step.clone()
            }
            _ => return,
        };
        let context = self.plan.context_for(&step);
        let executor = self.executor.clone();
        let plan_id = self.plan.id.clone();
        let cancel = self.cancel.clone();

        inflight.spawn(async move {
            let step_id = step.id.clone();
            let execution =
                tokio::spawn(async move { executor.execute(&plan_id, &step, context, cancel).await });
            match execution.await {
                Ok(outcome) => outcome,
                Err(e) => StepOutcome {
                    result: StepResult::failed(step_id.clone(), format!("agent task aborted: {e}"), 0),
                    step_id,
                    attempts: 1,
                    attempt_log: Vec::new(),
                    interrupted: false,
                },
            }
        });
    }

    /// Writes an executor outcome back into the plan.
    fn apply(&mut self, outcome: StepOutcome) {
        let succeeded = outcome.succeeded();
        let interrupted = outcome.interrupted;
        let step_id = outcome.step_id.clone();

        let Some(step) = self.plan.step_mut(&step_id) else {
            log::warn!("Outcome for unknown step '{step_id}' ignored");
            return;
        };
        step.retry_count = outcome.retry_count();
        if outcome.attempts > 0 {
            step.result = Some(outcome.result);
        }

        if interrupted {
            step.transition(StepStatus::Skipped);
        } else if succeeded {
            step.transition(StepStatus::Completed);
        } else {
            step.transition(StepStatus::Failed);
            self.on_failure(step_id);
        }
    }

    /// Checkpoints a step outcome that landed before the rest of its wave.
    async fn persist_outcome(&mut self) {
        if self.save_error.is_some() {
            return;
        }
        if let Err(e) = self.save_checkpoint().await {
            log::error!(
                "Plan {} stops dispatching: checkpoint failed mid-wave",
                self.plan.id
            );
            self.save_error = Some(e);
        }
    }

    fn on_failure(&mut self, step_id: StepId) {
        let policy = self.plan.failure_policy;
        self.failures.push(step_id.clone());

        match policy {
            FailurePolicy::AbortOnFailure => {
                log::warn!(
                    "Step '{step_id}' failed; plan {} stops dispatching",
                    self.plan.id
                );
                self.request_halt(Halt::Abort);
            }
            FailurePolicy::SkipDependents => {
                let skipped = skip_dependents(&mut self.plan, &step_id);
                if !skipped.is_empty() {
                    log::info!(
                        "Step '{step_id}' failed; skipped {} dependent step(s)",
                        skipped.len()
                    );
                }
            }
            FailurePolicy::ContinueWithPartialInput => {
                log::info!("Step '{step_id}' failed; dependents continue with partial input");
            }
        }
    }

    fn handle(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Pause { reply } => {
                log::info!("Pause requested for plan {}", self.plan.id);
                self.request_halt(Halt::Pause);
                let _ = reply.send(());
            }
            DriverCommand::Cancel { reply } => {
                log::info!("Cancel requested for plan {}", self.plan.id);
                self.request_halt(Halt::Cancel);
                let _ = reply.send(());
            }
            DriverCommand::Skip { step_id, reply } => {
                let skipped = skip_cascade(&mut self.plan, &step_id);
                self.publish_snapshot();
                // The requester may have given up waiting.
                let _ = reply.send(skipped);
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }
    }

    fn request_halt(&mut self, halt: Halt) {
        self.halt = self.halt.max(Some(halt));
    }

    /// Moves the plan into its end-of-run state and persists it.
    async fn finish(mut self) -> (Plan, Option<OrchestratorError>) {
        self.drain_commands();
        let halt = match self.halt {
            Some(Halt::Pause) if self.plan.is_settled() => None,
            other => other,
        };

        let mut finished = self.plan.clone();
        let event = match halt {
            Some(Halt::Pause) => {
                for step in &mut finished.steps {
                    if step.status == StepStatus::Ready {
                        step.transition(StepStatus::Paused);
                    }
                }
                finished.transition(PlanStatus::Paused);
                PlanEvent::PlanPaused {
                    plan_id: finished.id.clone(),
                }
            }
            Some(Halt::Cancel) => {
                skip_unfinished(&mut finished);
                finished.transition(PlanStatus::Cancelled);
                PlanEvent::PlanCancelled {
                    plan_id: finished.id.clone(),
                }
            }
            Some(Halt::Abort) => {
                skip_unfinished(&mut finished);
                finished.transition(PlanStatus::Failed);
                self.failed_event(&finished)
            }
            None if !self.failures.is_empty() && finished.failure_policy.aborts() => {
                finished.transition(PlanStatus::Failed);
                self.failed_event(&finished)
            }
            None => {
                finished.transition(PlanStatus::Completed);
                PlanEvent::PlanCompleted {
                    plan_id: finished.id.clone(),
                    progress_percentage: finished.progress_percentage(),
                }
            }
        };

        match self.store.save(&finished).await {
            Ok(checkpoint) => {
                self.plan = finished;
                self.publish_snapshot();
                self.events.publish(PlanEvent::CheckpointSaved {
                    plan_id: self.plan.id.clone(),
                    checkpoint,
                    progress_percentage: self.plan.progress_percentage(),
                });
                log::info!("Plan {} is {}", self.plan.id, self.plan.status);
                self.events.publish(event);
                (self.plan, None)
            }
            Err(e) => self.halted(e),
        }
    }

    fn failed_event(&self, plan: &Plan) -> PlanEvent {
        let reason = self
            .failures
            .first()
            .and_then(|id| plan.step(id))
            .map(|step| {
                let error = step
                    .result
                    .as_ref()
                    .and_then(|r| r.error.as_deref())
                    .unwrap_or("unknown error");
                format!("step '{}' failed: {error}", step.id)
            })
            .unwrap_or_else(|| "step failure".to_string());

        PlanEvent::PlanFailed {
            plan_id: plan.id.clone(),
            failed_steps: self.failures.clone(),
            reason,
        }
    }

    async fn save_checkpoint(&mut self) -> Result<()> {
        self.plan.touch();
        let checkpoint = self.store.save(&self.plan).await?;
        log::debug!(
            "Plan {} checkpoint {checkpoint} at {:.1}%",
            self.plan.id,
            self.plan.progress_percentage()
        );
        self.events.publish(PlanEvent::CheckpointSaved {
            plan_id: self.plan.id.clone(),
            checkpoint,
            progress_percentage: self.plan.progress_percentage(),
        });
        Ok(())
    }

    fn halted(self, error: OrchestratorError) -> (Plan, Option<OrchestratorError>) {
        log::error!("Plan {} halted: {error}", self.plan.id);
        (self.plan, Some(error))
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.plan.clone());
    }
}

/// Marks every step that never reached a verdict as skipped.
fn skip_unfinished(plan: &mut Plan) {
    for step in &mut plan.steps {
        if !step.is_terminal() {
            step.transition(StepStatus::Skipped);
        }
    }
}
