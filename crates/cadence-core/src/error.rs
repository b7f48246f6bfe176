//! Error types for the orchestration library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{PlanId, PlanStatus, StepId};

/// Comprehensive error type for all orchestrator operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The step graph contains a dependency cycle
    #[error("Cyclic dependency detected between steps: {}", join_ids(.steps))]
    CyclicDependency { steps: Vec<StepId> },
    /// No agent is registered for the requested capability
    #[error("No agent registered for capability '{capability}'")]
    CapabilityNotFound { capability: String },
    /// An agent invocation failed
    #[error("Agent execution failed for step '{step_id}': {message}")]
    AgentExecution { step_id: StepId, message: String },
    /// A step result was rejected by the quality gate
    #[error("Quality gate rejected step '{step_id}': {reason}")]
    QualityGate { step_id: StepId, reason: String },
    /// An agent invocation exceeded its timeout
    #[error("Step '{step_id}' timed out after {timeout_ms}ms")]
    Timeout { step_id: StepId, timeout_ms: u64 },
    /// Checkpoint or plan persistence failed
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    Validation { field: String, reason: String },
    /// Plan not found for the given ID
    #[error("Plan with ID {id} not found")]
    PlanNotFound { id: PlanId },
    /// Step not found within a plan
    #[error("Step '{id}' not found in plan {plan_id}")]
    StepNotFound { plan_id: PlanId, id: StepId },
    /// Checkpoint not found for a plan
    #[error("Checkpoint {sequence} not found for plan {plan_id}")]
    CheckpointNotFound { plan_id: PlanId, sequence: u64 },
    /// The requested operation is not legal in the plan's current state
    #[error("Cannot {operation} plan {plan_id} while it is {status}")]
    InvalidTransition {
        plan_id: PlanId,
        status: PlanStatus,
        operation: &'static str,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(StepId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builder for creating persistence errors with optional context.
pub struct PersistenceErrorBuilder {
    message: String,
}

impl PersistenceErrorBuilder {
    /// Create a new persistence error builder with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error with the given source.
    pub fn with_source<E>(self, source: E) -> OrchestratorError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OrchestratorError::Persistence {
            message: self.message,
            source: Some(Box::new(source)),
        }
    }

    /// Build the error without an underlying source.
    pub fn build(self) -> OrchestratorError {
        OrchestratorError::Persistence {
            message: self.message,
            source: None,
        }
    }
}

/// Builder for creating input validation errors.
pub struct ValidationErrorBuilder {
    field: String,
}

impl ValidationErrorBuilder {
    /// Create a new validation error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> OrchestratorError {
        OrchestratorError::Validation {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl OrchestratorError {
    /// Creates a builder for persistence errors.
    pub fn persistence(message: impl Into<String>) -> PersistenceErrorBuilder {
        PersistenceErrorBuilder::new(message)
    }

    /// Creates a builder for input validation errors.
    pub fn validation(field: impl Into<String>) -> ValidationErrorBuilder {
        ValidationErrorBuilder::new(field)
    }

    /// Whether the error came from the storage layer.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::FileSystem { .. })
    }
}

/// Specialized extension trait for storage-related Results.
pub trait PersistenceResultExt<T> {
    /// Map storage errors to [`OrchestratorError::Persistence`] with a message.
    fn persist_context(self, message: &str) -> Result<T>;
}

impl<T, E> PersistenceResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn persist_context(self, message: &str) -> Result<T> {
        self.map_err(|e| OrchestratorError::persistence(message).with_source(e))
    }
}

/// Extension trait for configuration-related Results.
pub trait ConfigResultExt<T> {
    /// Map any displayable error into a configuration error with context.
    fn config_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display;
}

impl<T, E> ConfigResultExt<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn config_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display,
    {
        self.map_err(|e| OrchestratorError::Configuration {
            message: format!("{context}: {e}"),
        })
    }
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_lists_steps() {
        let err = OrchestratorError::CyclicDependency {
            steps: vec![StepId::from("a"), StepId::from("b")],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic dependency detected between steps: a, b"
        );
    }

    #[test]
    fn test_persist_context_wraps_source() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
        let err = io.persist_context("Failed to write checkpoint").unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(err.to_string(), "Persistence error: Failed to write checkpoint");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_builder() {
        let err = OrchestratorError::validation("dependencies").with_reason("unknown step 'x'");
        assert!(matches!(err, OrchestratorError::Validation { .. }));
        assert!(err.to_string().contains("unknown step 'x'"));
    }
}
