//! Retry policies and the failure classification they act on.

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::models::Capability;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The agent rejected its input as malformed
    Validation,
    /// No agent is registered for the step's capability
    CapabilityNotFound,
    /// The agent exists but cannot serve right now
    CapabilityUnavailable,
    /// The attempt exceeded its timeout
    Timeout,
    /// The agent reported an execution error
    Execution,
    /// The result was rejected by the quality gate
    QualityGate,
}

impl FailureKind {
    /// Whether a failure of this kind may be retried at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FailureKind::Validation | FailureKind::CapabilityNotFound
        )
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::CapabilityNotFound => "capability_not_found",
            FailureKind::CapabilityUnavailable => "capability_unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::Execution => "execution",
            FailureKind::QualityGate => "quality_gate",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Never retry
    NoRetry,
    /// Wait `initial_delay` before every retry
    FixedDelay,
    /// Wait `initial_delay × attempt`
    LinearBackoff,
    /// Wait `initial_delay × backoff_factor^(attempt − 1)`
    #[default]
    ExponentialBackoff,
}

/// Whether to retry and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    /// A decision not to retry.
    pub const fn stop() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }

    /// A decision to retry after `delay`.
    pub const fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

/// Retry configuration for one capability (or the global default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// Number of retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::ExponentialBackoff,
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            strategy: RetryStrategy::NoRetry,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Fixed delay between retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::FixedDelay,
            max_retries,
            initial_delay_ms: duration_ms(delay),
            max_delay_ms: duration_ms(delay),
            ..Self::default()
        }
    }

    /// Delay growing linearly with the attempt number.
    pub fn linear(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::LinearBackoff,
            max_retries,
            initial_delay_ms: duration_ms(initial_delay),
            max_delay_ms: duration_ms(max_delay),
            ..Self::default()
        }
    }

    /// Delay growing geometrically with the attempt number.
    pub fn exponential(
        max_retries: u32,
        initial_delay: Duration,
        backoff_factor: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            strategy: RetryStrategy::ExponentialBackoff,
            max_retries,
            initial_delay_ms: duration_ms(initial_delay),
            backoff_factor,
            max_delay_ms: duration_ms(max_delay),
        }
    }

    /// Same policy with a different retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Decides whether the attempt numbered `attempt` (1-based) may be
    /// followed by another one.
    pub fn should_retry(&self, attempt: u32, failure: FailureKind) -> RetryDecision {
        if !failure.is_retryable()
            || self.strategy == RetryStrategy::NoRetry
            || attempt > self.max_retries
        {
            return RetryDecision::stop();
        }
        RetryDecision::after(self.delay_for(attempt))
    }

    /// Delay before the retry that follows attempt number `attempt`.
    ///
    /// Always within `[0, max_delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let initial = self.initial_delay_ms as f64;
        let raw_ms = match self.strategy {
            RetryStrategy::NoRetry => 0.0,
            RetryStrategy::FixedDelay => initial,
            RetryStrategy::LinearBackoff => initial * f64::from(attempt),
            RetryStrategy::ExponentialBackoff => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                initial * self.backoff_factor.powi(exponent)
            }
        };
        let max_ms = self.max_delay_ms as f64;
        let clamped = if raw_ms.is_nan() {
            0.0
        } else {
            raw_ms.clamp(0.0, max_ms)
        };
        Duration::from_millis(clamped as u64)
    }

    /// Checks the policy parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoff_factor must be a finite number >= 1, got {}",
                self.backoff_factor
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Retry policies keyed by capability with a global fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyEngine {
    global: RetryPolicy,
    per_capability: HashMap<Capability, RetryPolicy>,
}

impl RetryPolicyEngine {
    /// Creates an engine with the given global policy.
    pub fn new(global: RetryPolicy) -> Self {
        Self {
            global,
            per_capability: HashMap::new(),
        }
    }

    /// Attaches a policy to one capability.
    pub fn with_policy(mut self, capability: impl Into<Capability>, policy: RetryPolicy) -> Self {
        self.per_capability.insert(capability.into(), policy);
        self
    }

    /// Attaches a policy to one capability.
    pub fn set_policy(&mut self, capability: impl Into<Capability>, policy: RetryPolicy) {
        self.per_capability.insert(capability.into(), policy);
    }

    /// The global fallback policy.
    pub fn global(&self) -> &RetryPolicy {
        &self.global
    }

    /// The policy that applies to `capability`.
    pub fn policy_for(&self, capability: &Capability) -> &RetryPolicy {
        self.per_capability.get(capability).unwrap_or(&self.global)
    }

    /// Decides on a retry for `capability` after attempt `attempt` failed.
    pub fn should_retry(
        &self,
        capability: &Capability,
        attempt: u32,
        failure: FailureKind,
    ) -> RetryDecision {
        self.policy_for(capability).should_retry(attempt, failure)
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
