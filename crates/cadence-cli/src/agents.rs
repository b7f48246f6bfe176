//! Agents shipped with the binary so plans can run without external
//! providers.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{
    agent::{Agent, AgentError, AgentOutput, StepInput},
    models::StepContext,
    AgentRegistry,
};
use serde_json::{Map, Value};

/// Returns its input parameters unchanged.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute_step(
        &self,
        input: &StepInput,
        _context: &StepContext,
    ) -> Result<AgentOutput, AgentError> {
        Ok(AgentOutput::success(Value::Object(input.parameters.clone()))
            .with_source(format!("cadence://{}/{}", input.plan_id, input.step_id)))
    }
}

/// Combines the outputs of its dependencies into one object keyed by step id.
///
/// Missing dependency outputs become `null` and lower the confidence score in
/// proportion; the result is then marked partial.
pub struct MergeAgent;

#[async_trait]
impl Agent for MergeAgent {
    fn name(&self) -> &str {
        "merge"
    }

    async fn execute_step(
        &self,
        input: &StepInput,
        context: &StepContext,
    ) -> Result<AgentOutput, AgentError> {
        if context.is_empty() {
            return Err(AgentError::InvalidInput(format!(
                "step '{}' has no dependencies to merge",
                input.step_id
            )));
        }

        let mut merged = Map::new();
        let mut missing = 0usize;
        for (step_id, dependency) in context {
            let value = match dependency.output() {
                Some(output) => output.clone(),
                None => {
                    missing += 1;
                    Value::Null
                }
            };
            merged.insert(step_id.to_string(), value);
        }

        let available = context.len() - missing;
        let confidence = available as f64 / context.len() as f64;
        let output = AgentOutput::success(Value::Object(merged)).with_scores(confidence, 1.0);
        Ok(if missing > 0 { output.partial() } else { output })
    }
}

/// Registry with every built-in agent.
pub fn builtin_registry() -> AgentRegistry {
    AgentRegistry::new()
        .with_agent("echo", Arc::new(EchoAgent))
        .with_agent("merge", Arc::new(MergeAgent))
}
