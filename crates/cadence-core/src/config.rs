//! Orchestrator configuration.
//!
//! Configuration is plain serde JSON. Every field has a default, so an empty
//! object is a valid configuration:
//!
//! ```json
//! {
//!   "max_concurrency": 4,
//!   "step_timeout_ms": 60000,
//!   "retry": { "global": { "strategy": "exponential_backoff", "max_retries": 3 } },
//!   "quality": { "per_capability": { "legal_search": { "min_confidence_score": 0.8 } } },
//!   "store": { "backend": "sqlite", "path": "/var/lib/cadence/cadence.db" }
//! }
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigResultExt, OrchestratorError, Result},
    quality::QualityGateEvaluator,
    retry::RetryPolicyEngine,
    store::StoreConfig,
};

/// Tunables of a [`crate::PlanOrchestrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on steps running at once within a wave
    pub max_concurrency: usize,
    /// Per-attempt timeout unless a step overrides it
    pub step_timeout_ms: u64,
    /// Events buffered per listener before it starts lagging
    pub event_capacity: usize,
    pub retry: RetryPolicyEngine,
    pub quality: QualityGateEvaluator,
    pub store: StoreConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            step_timeout_ms: 60_000,
            event_capacity: 256,
            retry: RetryPolicyEngine::default(),
            quality: QualityGateEvaluator::default(),
            store: StoreConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::FileSystem` if the file cannot be read and
    /// `OrchestratorError::Configuration` if it is malformed or invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| OrchestratorError::FileSystem {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw)
            .config_context(format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and every retry/quality policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(OrchestratorError::Configuration {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }
        if self.step_timeout_ms == 0 {
            return Err(OrchestratorError::Configuration {
                message: "step_timeout_ms must be at least 1".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(OrchestratorError::Configuration {
                message: "event_capacity must be at least 1".to_string(),
            });
        }
        self.retry.validate().config_context("Invalid retry policy")?;
        self.quality
            .validate()
            .config_context("Invalid quality policy")?;
        Ok(())
    }

    /// The default per-attempt timeout.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}
