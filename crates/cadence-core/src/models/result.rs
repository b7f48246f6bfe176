//! Step results and the dependency context handed to agents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ResultStatus, StepId};

/// Final output of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// Step that produced the result
    pub step_id: StepId,

    /// Opaque payload returned by the agent
    #[serde(default)]
    pub output: Value,

    /// Agent-reported confidence in [0, 1]
    #[serde(default)]
    pub confidence_score: f64,

    /// Agent-reported quality in [0, 1]
    #[serde(default)]
    pub quality_score: f64,

    /// Sources backing the output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Wall-clock time of the accepted (or last) attempt
    #[serde(default)]
    pub execution_time_ms: u64,

    /// Outcome classification
    pub status: ResultStatus,

    /// Final error, present iff `status` is failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Builds a failed result carrying `error` as its reason.
    pub fn failed(step_id: StepId, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            step_id,
            output: Value::Null,
            confidence_score: 0.0,
            quality_score: 0.0,
            sources: Vec::new(),
            execution_time_ms,
            status: ResultStatus::Failed,
            error: Some(error.into()),
        }
    }

    /// Whether the result was accepted.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, ResultStatus::Failed)
    }
}

/// Value of one dependency as seen by a dependent step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyOutput {
    /// The dependency completed and produced this output
    Available { output: Value },

    /// The dependency did not produce an output
    Absent { reason: String },
}

impl DependencyOutput {
    /// The output value, if the dependency produced one.
    pub fn output(&self) -> Option<&Value> {
        match self {
            DependencyOutput::Available { output } => Some(output),
            DependencyOutput::Absent { .. } => None,
        }
    }

    /// Whether the dependency produced no output.
    pub fn is_absent(&self) -> bool {
        matches!(self, DependencyOutput::Absent { .. })
    }
}

/// Dependency outputs keyed by dependency step id.
pub type StepContext = BTreeMap<StepId, DependencyOutput>;
