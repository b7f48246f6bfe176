//! The step-execution contract implemented by capability providers.
//!
//! An [`Agent`] receives the step's input parameters together with the
//! outputs of its dependencies and returns an [`AgentOutput`]. Agents never
//! see or mutate plan state; the orchestrator applies their outputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    models::{Capability, PlanId, ResultStatus, StepContext, StepId, StepResult},
    retry::FailureKind,
};

/// Everything an agent learns about the step it executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub plan_id: PlanId,
    pub step_id: StepId,
    pub description: String,
    pub capability: Capability,
    /// Step input parameters
    pub parameters: Map<String, Value>,
    /// 1-based attempt number
    pub attempt: u32,
}

/// What an agent returns for a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub output: Value,
    pub confidence_score: f64,
    pub quality_score: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub status: ResultStatus,
}

impl AgentOutput {
    /// A fully confident, successful output.
    pub fn success(output: Value) -> Self {
        Self {
            output,
            confidence_score: 1.0,
            quality_score: 1.0,
            sources: Vec::new(),
            status: ResultStatus::Success,
        }
    }

    /// Sets confidence and quality scores.
    pub fn with_scores(mut self, confidence_score: f64, quality_score: f64) -> Self {
        self.confidence_score = confidence_score;
        self.quality_score = quality_score;
        self
    }

    /// Appends a source reference.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Marks the output as partial.
    pub fn partial(mut self) -> Self {
        self.status = ResultStatus::Partial;
        self
    }

    /// Converts into a step result, clamping scores into [0, 1].
    pub(crate) fn into_result(self, step_id: StepId, execution_time_ms: u64) -> StepResult {
        StepResult {
            step_id,
            output: self.output,
            confidence_score: clamp_score(self.confidence_score),
            quality_score: clamp_score(self.quality_score),
            sources: self.sources,
            execution_time_ms,
            status: self.status,
            error: None,
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Errors an agent may report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The input is malformed; retrying cannot help
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The provider is temporarily unable to serve
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    /// The invocation failed
    #[error("{0}")]
    Failed(String),
}

impl AgentError {
    /// Retry classification of the error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::InvalidInput(_) => FailureKind::Validation,
            AgentError::Unavailable(_) => FailureKind::CapabilityUnavailable,
            AgentError::Failed(_) => FailureKind::Execution,
        }
    }
}

/// A capability provider.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Short human-readable name used in logs.
    fn name(&self) -> &str {
        "agent"
    }

    /// Executes one attempt of a step.
    async fn execute_step(
        &self,
        input: &StepInput,
        context: &StepContext,
    ) -> Result<AgentOutput, AgentError>;
}
