//! Builder for creating and configuring [`PlanOrchestrator`] instances.

use std::{fmt, path::Path, sync::Arc};

use super::PlanOrchestrator;
use crate::{
    agent::Agent,
    config::OrchestratorConfig,
    error::Result,
    models::Capability,
    registry::{AgentDescriptor, AgentRegistry},
    store::{open_store, CheckpointStore},
};

/// Builder for creating and configuring [`PlanOrchestrator`] instances.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    registry: AgentRegistry,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with default settings and no agents.
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            registry: AgentRegistry::new(),
            store: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the agent registry.
    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers `agent` for `capability`.
    pub fn with_agent(mut self, capability: impl Into<Capability>, agent: Arc<dyn Agent>) -> Self {
        self.registry.register_agent(capability, agent);
        self
    }

    /// Registers a fully described agent.
    pub fn with_descriptor(mut self, descriptor: AgentDescriptor) -> Self {
        self.registry.register(descriptor);
        self
    }

    /// Uses an already opened store instead of the configured one.
    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets a custom storage location.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/cadence/cadence.db` or `~/.local/share/cadence/cadence.db`
    /// (a directory for the file backend).
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.config.store.path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Builds the configured orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Configuration` if the configuration is
    /// invalid, and `OrchestratorError::FileSystem` or
    /// `OrchestratorError::Persistence` if the store cannot be opened.
    pub async fn build(self) -> Result<PlanOrchestrator> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config.store).await?,
        };

        Ok(PlanOrchestrator::new(&self.config, self.registry, store))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("custom_store", &self.store.is_some())
            .finish()
    }
}
