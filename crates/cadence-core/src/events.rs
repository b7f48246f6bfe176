//! Lifecycle events and their fan-out to observers.
//!
//! Publishing goes through a `tokio` broadcast channel and never blocks the
//! publisher. A listener that falls behind by more than the channel capacity
//! loses the oldest events and is told how many it missed on its next receive.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{CheckpointId, PlanId, PlanStatus, StepId};

/// Lifecycle event emitted by the orchestrator and step executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlanEvent {
    PlanStarted {
        plan_id: PlanId,
        total_steps: usize,
    },
    WaveStarted {
        plan_id: PlanId,
        wave: usize,
        steps: Vec<StepId>,
    },
    StepStarted {
        plan_id: PlanId,
        step_id: StepId,
        attempt: u32,
    },
    StepCompleted {
        plan_id: PlanId,
        step_id: StepId,
        attempts: u32,
        execution_time_ms: u64,
    },
    StepFailed {
        plan_id: PlanId,
        step_id: StepId,
        attempt: u32,
        error: String,
        will_retry: bool,
    },
    QualityGateFailed {
        plan_id: PlanId,
        step_id: StepId,
        attempt: u32,
        reason: String,
        will_retry: bool,
    },
    CheckpointSaved {
        plan_id: PlanId,
        checkpoint: CheckpointId,
        progress_percentage: f64,
    },
    PlanPaused {
        plan_id: PlanId,
    },
    PlanResumed {
        plan_id: PlanId,
    },
    PlanCompleted {
        plan_id: PlanId,
        progress_percentage: f64,
    },
    PlanFailed {
        plan_id: PlanId,
        failed_steps: Vec<StepId>,
        reason: String,
    },
    PlanCancelled {
        plan_id: PlanId,
    },
}

impl PlanEvent {
    /// Plan the event belongs to.
    pub fn plan_id(&self) -> &PlanId {
        match self {
            PlanEvent::PlanStarted { plan_id, .. }
            | PlanEvent::WaveStarted { plan_id, .. }
            | PlanEvent::StepStarted { plan_id, .. }
            | PlanEvent::StepCompleted { plan_id, .. }
            | PlanEvent::StepFailed { plan_id, .. }
            | PlanEvent::QualityGateFailed { plan_id, .. }
            | PlanEvent::CheckpointSaved { plan_id, .. }
            | PlanEvent::PlanPaused { plan_id }
            | PlanEvent::PlanResumed { plan_id }
            | PlanEvent::PlanCompleted { plan_id, .. }
            | PlanEvent::PlanFailed { plan_id, .. }
            | PlanEvent::PlanCancelled { plan_id } => plan_id,
        }
    }

    /// Stable snake_case event name.
    pub fn name(&self) -> &'static str {
        match self {
            PlanEvent::PlanStarted { .. } => "plan_started",
            PlanEvent::WaveStarted { .. } => "wave_started",
            PlanEvent::StepStarted { .. } => "step_started",
            PlanEvent::StepCompleted { .. } => "step_completed",
            PlanEvent::StepFailed { .. } => "step_failed",
            PlanEvent::QualityGateFailed { .. } => "quality_gate_failed",
            PlanEvent::CheckpointSaved { .. } => "checkpoint_saved",
            PlanEvent::PlanPaused { .. } => "plan_paused",
            PlanEvent::PlanResumed { .. } => "plan_resumed",
            PlanEvent::PlanCompleted { .. } => "plan_completed",
            PlanEvent::PlanFailed { .. } => "plan_failed",
            PlanEvent::PlanCancelled { .. } => "plan_cancelled",
        }
    }

    /// Terminal or suspending plan-level event.
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            PlanEvent::PlanPaused { .. }
                | PlanEvent::PlanCompleted { .. }
                | PlanEvent::PlanFailed { .. }
                | PlanEvent::PlanCancelled { .. }
        )
    }

    /// Plan status implied by a plan-level event.
    pub fn implied_status(&self) -> Option<PlanStatus> {
        match self {
            PlanEvent::PlanStarted { .. } | PlanEvent::PlanResumed { .. } => {
                Some(PlanStatus::Running)
            }
            PlanEvent::PlanPaused { .. } => Some(PlanStatus::Paused),
            PlanEvent::PlanCompleted { .. } => Some(PlanStatus::Completed),
            PlanEvent::PlanFailed { .. } => Some(PlanStatus::Failed),
            PlanEvent::PlanCancelled { .. } => Some(PlanStatus::Cancelled),
            _ => None,
        }
    }
}

/// In-process broadcast bus for [`PlanEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Return the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event to every active listener.
    pub fn publish(&self, event: PlanEvent) {
        log::trace!("event {} for plan {}", event.name(), event.plan_id());
        // No listeners is not an error.
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.tx.subscribe()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
