//! Step model definition and related functionality.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Capability, StepId, StepResult, StepStatus};

/// Represents an individual unit of work within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Identifier, unique within the owning plan
    pub id: StepId,

    /// Position in declaration order (0-indexed)
    #[serde(default)]
    pub sequence_index: u32,

    /// What the step is meant to accomplish
    #[serde(default)]
    pub description: String,

    /// Capability tag used to resolve an agent
    pub required_capability: Capability,

    /// Steps whose outputs this step consumes
    #[serde(default)]
    pub dependencies: BTreeSet<StepId>,

    /// Current status of the step
    #[serde(default)]
    pub status: StepStatus,

    /// Number of retries consumed by the latest execution
    #[serde(default)]
    pub retry_count: u32,

    /// Per-step override of the retry budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Per-step override of the attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Input parameters handed to the agent
    #[serde(default)]
    pub input: Map<String, Value>,

    /// Latest result, replaced on every execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,

    /// Timestamp of the last status change (UTC)
    #[serde(default = "Timestamp::now")]
    pub updated_at: Timestamp,
}

impl Step {
    /// Creates a pending step with no dependencies.
    pub fn new(id: impl Into<StepId>, capability: impl Into<Capability>) -> Self {
        Self {
            id: id.into(),
            sequence_index: 0,
            description: String::new(),
            required_capability: capability.into(),
            dependencies: BTreeSet::new(),
            status: StepStatus::Pending,
            retry_count: 0,
            max_retries: None,
            timeout_ms: None,
            input: Map::new(),
            result: None,
            updated_at: Timestamp::now(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a dependency on another step.
    pub fn depends_on(mut self, step_id: impl Into<StepId>) -> Self {
        self.dependencies.insert(step_id.into());
        self
    }

    /// Adds a single input parameter.
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Overrides the retry budget for this step.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Overrides the per-attempt timeout for this step.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Whether the step has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the step has been dispatched or finished.
    pub fn has_started(&self) -> bool {
        matches!(self.status, StepStatus::Running) || self.is_terminal()
    }

    /// Moves the step to a new status and refreshes its timestamp.
    pub(crate) fn transition(&mut self, status: StepStatus) {
        self.status = status;
        self.updated_at = Timestamp::now();
    }
}
