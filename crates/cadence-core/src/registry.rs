//! Capability-tag to agent lookup.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    agent::Agent,
    error::{OrchestratorError, Result},
    models::Capability,
};

/// A registered agent with the capabilities it serves.
pub struct AgentDescriptor {
    capabilities: Vec<Capability>,
    agent: Arc<dyn Agent>,
    max_concurrency: Option<usize>,
    limiter: Option<Arc<Semaphore>>,
}

impl AgentDescriptor {
    /// Describes `agent` as serving `capability`.
    pub fn new(capability: impl Into<Capability>, agent: Arc<dyn Agent>) -> Self {
        Self {
            capabilities: vec![capability.into()],
            agent,
            max_concurrency: None,
            limiter: None,
        }
    }

    /// Adds another capability tag served by the same agent.
    pub fn with_capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Limits how many invocations of this agent may run at once.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        let limit = limit.max(1);
        self.max_concurrency = Some(limit);
        self.limiter = Some(Arc::new(Semaphore::new(limit)));
        self
    }

    /// Capability tags served by the agent.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Declared concurrency limit, if any.
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// The executable agent.
    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    /// Waits for a concurrency slot when the agent declares a limit.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        }
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.agent.name())
            .field("capabilities", &self.capabilities)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// Chooses among several agents registered for the same capability.
pub trait SelectionStrategy: Send + Sync {
    /// Index into `candidates` of the agent to use. `candidates` is never empty.
    fn select(&self, capability: &Capability, candidates: &[Arc<AgentDescriptor>]) -> usize;
}

/// Always picks the agent registered first.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstRegistered;

impl SelectionStrategy for FirstRegistered {
    fn select(&self, _capability: &Capability, _candidates: &[Arc<AgentDescriptor>]) -> usize {
        0
    }
}

/// Rotates through the candidates on every resolution.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, _capability: &Capability, candidates: &[Arc<AgentDescriptor>]) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % candidates.len()
    }
}

/// Lookup table from capability tag to agents.
pub struct AgentRegistry {
    entries: HashMap<Capability, Vec<Arc<AgentDescriptor>>>,
    strategy: Box<dyn SelectionStrategy>,
}

impl AgentRegistry {
    /// Creates an empty registry using [`FirstRegistered`] selection.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            strategy: Box::new(FirstRegistered),
        }
    }

    /// Replaces the selection strategy.
    pub fn with_strategy(mut self, strategy: impl SelectionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Registers a descriptor under every capability it lists.
    pub fn register(&mut self, descriptor: AgentDescriptor) {
        let descriptor = Arc::new(descriptor);
        for capability in descriptor.capabilities() {
            log::debug!(
                "Registering agent '{}' for capability '{capability}'",
                descriptor.agent().name()
            );
            self.entries
                .entry(capability.clone())
                .or_default()
                .push(Arc::clone(&descriptor));
        }
    }

    /// Registers `agent` for a single capability.
    pub fn register_agent(&mut self, capability: impl Into<Capability>, agent: Arc<dyn Agent>) {
        self.register(AgentDescriptor::new(capability, agent));
    }

    /// Builder-style registration.
    pub fn with_agent(mut self, capability: impl Into<Capability>, agent: Arc<dyn Agent>) -> Self {
        self.register_agent(capability, agent);
        self
    }

    /// Resolves the agent serving `capability`.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::CapabilityNotFound` if nothing is registered
    /// for the tag.
    pub fn resolve(&self, capability: &Capability) -> Result<Arc<AgentDescriptor>> {
        let candidates = self
            .entries
            .get(capability)
            .filter(|candidates| !candidates.is_empty())
            .ok_or_else(|| OrchestratorError::CapabilityNotFound {
                capability: capability.to_string(),
            })?;
        let index = self.strategy.select(capability, candidates).min(candidates.len() - 1);
        Ok(Arc::clone(&candidates[index]))
    }

    /// Whether any agent serves `capability`.
    pub fn contains(&self, capability: &Capability) -> bool {
        self.entries.get(capability).is_some_and(|c| !c.is_empty())
    }

    /// Registered capability tags, sorted.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities: Vec<Capability> = self.entries.keys().cloned().collect();
        capabilities.sort();
        capabilities
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        agent::{AgentError, AgentOutput, StepInput},
        models::StepContext,
    };

    struct Named(&'static str);

    #[async_trait]
    impl Agent for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute_step(
            &self,
            _input: &StepInput,
            _context: &StepContext,
        ) -> std::result::Result<AgentOutput, AgentError> {
            Ok(AgentOutput::success(json!(self.0)))
        }
    }

    fn resolved_name(registry: &AgentRegistry, capability: &str) -> String {
        registry
            .resolve(&Capability::from(capability))
            .expect("capability registered")
            .agent()
            .name()
            .to_string()
    }

    #[test]
    fn test_unknown_capability_is_an_error() {
        let registry = AgentRegistry::new();
        let err = registry.resolve(&Capability::from("missing")).unwrap_err();
        assert!(matches!(err, OrchestratorError::CapabilityNotFound { capability } if capability == "missing"));
    }

    #[test]
    fn test_first_registered_wins_by_default() {
        let registry = AgentRegistry::new()
            .with_agent("search", Arc::new(Named("first")))
            .with_agent("search", Arc::new(Named("second")));
        assert_eq!(resolved_name(&registry, "search"), "first");
        assert_eq!(resolved_name(&registry, "search"), "first");
    }

    #[test]
    fn test_round_robin_rotates() {
        let registry = AgentRegistry::new()
            .with_strategy(RoundRobin::default())
            .with_agent("search", Arc::new(Named("first")))
            .with_agent("search", Arc::new(Named("second")));
        assert_eq!(resolved_name(&registry, "search"), "first");
        assert_eq!(resolved_name(&registry, "search"), "second");
        assert_eq!(resolved_name(&registry, "search"), "first");
    }

    #[test]
    fn test_descriptor_serves_several_capabilities() {
        let mut registry = AgentRegistry::new();
        registry.register(
            AgentDescriptor::new("summarise", Arc::new(Named("llm")))
                .with_capability("translate")
                .with_max_concurrency(2),
        );
        assert!(registry.contains(&Capability::from("translate")));
        assert_eq!(
            registry.capabilities(),
            vec![Capability::from("summarise"), Capability::from("translate")]
        );
        let descriptor = registry
            .resolve(&Capability::from("translate"))
            .expect("registered");
        assert_eq!(descriptor.max_concurrency(), Some(2));
    }

    #[tokio::test]
    async fn test_concurrency_limit_hands_out_permits() {
        let descriptor = AgentDescriptor::new("x", Arc::new(Named("x"))).with_max_concurrency(1);
        let permit = descriptor.acquire().await;
        assert!(permit.is_some());
        assert!(descriptor
            .limiter
            .as_ref()
            .is_some_and(|l| l.available_permits() == 0));
        drop(permit);
        assert!(AgentDescriptor::new("y", Arc::new(Named("y"))).acquire().await.is_none());
    }
}
