//! Quality gates applied to step results before they are accepted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Capability, StepResult};

/// Thresholds a result must meet to be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub min_confidence_score: f64,
    pub min_quality_score: f64,
    pub require_sources: bool,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl QualityPolicy {
    /// Accepts every result.
    pub fn permissive() -> Self {
        Self {
            min_confidence_score: 0.0,
            min_quality_score: 0.0,
            require_sources: false,
        }
    }

    /// Requires both scores to reach the given thresholds.
    pub fn with_thresholds(min_confidence_score: f64, min_quality_score: f64) -> Self {
        Self {
            min_confidence_score,
            min_quality_score,
            require_sources: false,
        }
    }

    /// Same policy, additionally requiring at least one source.
    pub fn requiring_sources(mut self) -> Self {
        self.require_sources = true;
        self
    }

    /// Checks that thresholds lie within [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_confidence_score", self.min_confidence_score),
            ("min_quality_score", self.min_quality_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

/// Outcome of a quality gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub passed: bool,
    /// Every failed check, present iff the gate did not pass
    pub reason: Option<String>,
}

impl GateVerdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }
}

/// Evaluates step results against per-capability quality policies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateEvaluator {
    global: QualityPolicy,
    per_capability: HashMap<Capability, QualityPolicy>,
}

impl QualityGateEvaluator {
    /// Creates an evaluator with the given global policy.
    pub fn new(global: QualityPolicy) -> Self {
        Self {
            global,
            per_capability: HashMap::new(),
        }
    }

    /// Attaches a policy to one capability.
    pub fn with_policy(
        mut self,
        capability: impl Into<Capability>,
        policy: QualityPolicy,
    ) -> Self {
        self.per_capability.insert(capability.into(), policy);
        self
    }

    /// The policy that applies to `capability`.
    pub fn policy_for(&self, capability: &Capability) -> &QualityPolicy {
        self.per_capability.get(capability).unwrap_or(&self.global)
    }

    /// Checks `result` against `policy`; all checks must hold.
    pub fn evaluate(result: &StepResult, policy: &QualityPolicy) -> GateVerdict {
        let mut failures = Vec::new();

        if result.confidence_score < policy.min_confidence_score {
            failures.push(format!(
                "confidence score {:.2} below minimum {:.2}",
                result.confidence_score, policy.min_confidence_score
            ));
        }
        if result.quality_score < policy.min_quality_score {
            failures.push(format!(
                "quality score {:.2} below minimum {:.2}",
                result.quality_score, policy.min_quality_score
            ));
        }
        if policy.require_sources && result.sources.is_empty() {
            failures.push("no sources provided".to_string());
        }

        if failures.is_empty() {
            GateVerdict::pass()
        } else {
            GateVerdict {
                passed: false,
                reason: Some(failures.join("; ")),
            }
        }
    }

    /// Checks `result` against the policy configured for `capability`.
    pub fn evaluate_for(&self, capability: &Capability, result: &StepResult) -> GateVerdict {
        Self::evaluate(result, self.policy_for(capability))
    }

    /// Checks every configured policy.
    pub fn validate(&self) -> Result<(), String> {
        self.global.validate().map_err(|e| format!("global: {e}"))?;
        for (capability, policy) in &self.per_capability {
            policy.validate().map_err(|e| format!("{capability}: {e}"))?;
        }
        Ok(())
    }
}
