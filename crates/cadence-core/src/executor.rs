//! Execution of a single step: agent resolution, timeouts, retries and the
//! quality gate.
//!
//! The executor never touches plan state. It returns a [`StepOutcome`] that the
//! orchestrator applies to the step.

use std::{
    future,
    sync::Arc,
    time::{Duration, Instant},
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    agent::StepInput,
    error::OrchestratorError,
    events::{EventBus, PlanEvent},
    models::{PlanId, ResultStatus, Step, StepContext, StepId, StepResult},
    quality::QualityGateEvaluator,
    registry::AgentRegistry,
    retry::{FailureKind, RetryPolicyEngine},
};

/// Sending half of a cooperative cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals every token derived from this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// A new token observing this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of a cooperative cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
    }
}

/// Creates a linked cancellation handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// One invocation of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    pub started_at: Timestamp,
    pub duration_ms: u64,
    /// Classification of the failure, absent for the accepted attempt
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

/// Final result of executing a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step_id: StepId,
    /// Result to attach to the step
    pub result: StepResult,
    /// Number of agent invocations, including the accepted one
    pub attempts: u32,
    pub attempt_log: Vec<AttemptRecord>,
    /// Execution stopped on cancellation before reaching a verdict
    pub interrupted: bool,
}

impl StepOutcome {
    /// Whether the step produced an accepted result.
    pub fn succeeded(&self) -> bool {
        !self.interrupted && self.result.is_success()
    }

    /// Retries consumed: every attempt after the first.
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Runs steps against registered agents.
///
/// Cheap to clone; clones share the registry and policies.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<AgentRegistry>,
    retry: Arc<RetryPolicyEngine>,
    quality: Arc<QualityGateEvaluator>,
    events: EventBus,
    default_timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        retry: Arc<RetryPolicyEngine>,
        quality: Arc<QualityGateEvaluator>,
        events: EventBus,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            retry,
            quality,
            events,
            default_timeout,
        }
    }

    /// Executes `step` until it passes, fails without retry, exhausts its
    /// retries or is cancelled.
    ///
    /// Cancellation is observed before every attempt and during the wait
    /// between attempts; an attempt already in flight runs to completion.
    pub async fn execute(
        &self,
        plan_id: &PlanId,
        step: &Step,
        context: StepContext,
        mut cancel: CancelToken,
    ) -> StepOutcome {
        let clock = Instant::now();
        let capability = &step.required_capability;

        let descriptor = match self.registry.resolve(capability) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let message = e.to_string();
                log::warn!("Step '{}' cannot run: {message}", step.id);
                self.events.publish(PlanEvent::StepStarted {
                    plan_id: plan_id.clone(),
                    step_id: step.id.clone(),
                    attempt: 1,
                });
                self.events.publish(PlanEvent::StepFailed {
                    plan_id: plan_id.clone(),
                    step_id: step.id.clone(),
                    attempt: 1,
                    error: message.clone(),
                    will_retry: false,
                });
                let record = AttemptRecord {
                    attempt: 1,
                    started_at: Timestamp::now(),
                    duration_ms: 0,
                    failure: Some(FailureKind::CapabilityNotFound),
                    error: Some(message.clone()),
                };
                return StepOutcome {
                    step_id: step.id.clone(),
                    result: StepResult::failed(step.id.clone(), message, elapsed_ms(clock)),
                    attempts: 1,
                    attempt_log: vec![record],
                    interrupted: false,
                };
            }
        };

        let mut policy = self.retry.policy_for(capability).clone();
        if let Some(max_retries) = step.max_retries {
            policy = policy.with_max_retries(max_retries);
        }
        let timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        let mut attempt_log = Vec::new();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return interrupted(step, attempt, attempt_log, clock);
            }
            attempt += 1;

            self.events.publish(PlanEvent::StepStarted {
                plan_id: plan_id.clone(),
                step_id: step.id.clone(),
                attempt,
            });
            log::debug!(
                "Step '{}' attempt {attempt} on agent '{}'",
                step.id,
                descriptor.agent().name()
            );

            let input = StepInput {
                plan_id: plan_id.clone(),
                step_id: step.id.clone(),
                description: step.description.clone(),
                capability: capability.clone(),
                parameters: step.input.clone(),
                attempt,
            };

            let permit = tokio::select! {
                permit = descriptor.acquire() => permit,
                _ = cancel.cancelled() => {
                    return interrupted(step, attempt - 1, attempt_log, clock);
                }
            };

            let started_at = Timestamp::now();
            let attempt_clock = Instant::now();
            let invocation = tokio::time::timeout(
                timeout,
                descriptor.agent().execute_step(&input, &context),
            )
            .await;
            drop(permit);
            let duration_ms = elapsed_ms(attempt_clock);

            let (kind, error) = match invocation {
                Ok(Ok(output)) => {
                    let result = output.into_result(step.id.clone(), duration_ms);
                    if result.status == ResultStatus::Failed {
                        (
                            FailureKind::Execution,
                            OrchestratorError::AgentExecution {
                                step_id: step.id.clone(),
                                message: "agent reported a failed result".to_string(),
                            }
                            .to_string(),
                        )
                    } else {
                        let verdict = self.quality.evaluate_for(capability, &result);
                        match verdict.reason {
                            None => {
                                attempt_log.push(AttemptRecord {
                                    attempt,
                                    started_at,
                                    duration_ms,
                                    failure: None,
                                    error: None,
                                });
                                log::debug!(
                                    "Step '{}' accepted after {attempt} attempt(s)",
                                    step.id
                                );
                                self.events.publish(PlanEvent::StepCompleted {
                                    plan_id: plan_id.clone(),
                                    step_id: step.id.clone(),
                                    attempts: attempt,
                                    execution_time_ms: duration_ms,
                                });
                                return StepOutcome {
                                    step_id: step.id.clone(),
                                    result,
                                    attempts: attempt,
                                    attempt_log,
                                    interrupted: false,
                                };
                            }
                            Some(reason) => (FailureKind::QualityGate, reason),
                        }
                    }
                }
                Ok(Err(agent_error)) => (
                    agent_error.kind(),
                    OrchestratorError::AgentExecution {
                        step_id: step.id.clone(),
                        message: agent_error.to_string(),
                    }
                    .to_string(),
                ),
                Err(_) => (
                    FailureKind::Timeout,
                    OrchestratorError::Timeout {
                        step_id: step.id.clone(),
                        timeout_ms: duration_ms_of(timeout),
                    }
                    .to_string(),
                ),
            };

            let decision = policy.should_retry(attempt, kind);
            attempt_log.push(AttemptRecord {
                attempt,
                started_at,
                duration_ms,
                failure: Some(kind),
                error: Some(error.clone()),
            });

            if kind == FailureKind::QualityGate {
                log::debug!("Step '{}' attempt {attempt} rejected: {error}", step.id);
                self.events.publish(PlanEvent::QualityGateFailed {
                    plan_id: plan_id.clone(),
                    step_id: step.id.clone(),
                    attempt,
                    reason: error.clone(),
                    will_retry: decision.retry,
                });
            } else {
                log::debug!("Step '{}' attempt {attempt} failed ({kind}): {error}", step.id);
                self.events.publish(PlanEvent::StepFailed {
                    plan_id: plan_id.clone(),
                    step_id: step.id.clone(),
                    attempt,
                    error: error.clone(),
                    will_retry: decision.retry,
                });
            }

            if !decision.retry {
                let error = match kind {
                    FailureKind::QualityGate => OrchestratorError::QualityGate {
                        step_id: step.id.clone(),
                        reason: error,
                    }
                    .to_string(),
                    _ => error,
                };
                log::warn!(
                    "Step '{}' failed after {attempt} attempt(s): {error}",
                    step.id
                );
                return StepOutcome {
                    step_id: step.id.clone(),
                    result: StepResult::failed(step.id.clone(), error, elapsed_ms(clock)),
                    attempts: attempt,
                    attempt_log,
                    interrupted: false,
                };
            }

            log::warn!(
                "Retrying step '{}' in {}ms (attempt {attempt} failed)",
                step.id,
                decision.delay.as_millis()
            );
            if cancel.is_cancelled() {
                return interrupted(step, attempt, attempt_log, clock);
            }
            tokio::select! {
                _ = tokio::time::sleep(decision.delay) => {}
                _ = cancel.cancelled() => {
                    return interrupted(step, attempt, attempt_log, clock);
                }
            }
        }
    }
}

fn interrupted(
    step: &Step,
    attempts: u32,
    attempt_log: Vec<AttemptRecord>,
    clock: Instant,
) -> StepOutcome {
    log::debug!("Step '{}' interrupted after {attempts} attempt(s)", step.id);
    StepOutcome {
        step_id: step.id.clone(),
        result: StepResult::failed(
            step.id.clone(),
            format!("cancelled after {attempts} attempt(s)"),
            elapsed_ms(clock),
        ),
        attempts,
        attempt_log,
        interrupted: true,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    duration_ms_of(since.elapsed())
}

fn duration_ms_of(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
