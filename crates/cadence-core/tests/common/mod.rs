#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use cadence_core::{
    agent::{Agent, AgentError, AgentOutput, StepInput},
    error::{OrchestratorError, Result},
    models::{Checkpoint, CheckpointId, Plan, PlanId, StepContext, StepId},
    retry::{RetryPolicy, RetryPolicyEngine},
    store::{CheckpointStore, StoreBackend, StoreConfig},
    OrchestratorBuilder, OrchestratorConfig, PlanOrchestrator,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

/// Configuration with millisecond retries and a store inside `dir`.
pub fn test_config(dir: &Path, backend: StoreBackend) -> OrchestratorConfig {
    let path = match backend {
        StoreBackend::File => dir.join("checkpoints"),
        _ => dir.join("cadence.db"),
    };
    OrchestratorConfig {
        retry: RetryPolicyEngine::new(RetryPolicy::fixed(2, Duration::from_millis(1))),
        store: StoreConfig::new(backend).with_path(path),
        ..OrchestratorConfig::default()
    }
}

/// Helper function to create a test orchestrator backed by SQLite.
pub async fn create_test_orchestrator(
    agents: Vec<(&str, Arc<dyn Agent>)>,
) -> (TempDir, PlanOrchestrator) {
    create_orchestrator_with(StoreBackend::Sqlite, agents).await
}

pub async fn create_orchestrator_with(
    backend: StoreBackend,
    agents: Vec<(&str, Arc<dyn Agent>)>,
) -> (TempDir, PlanOrchestrator) {
    create_orchestrator_configured(backend, |_| {}, agents).await
}

/// Like [`create_orchestrator_with`], letting the test adjust the config.
pub async fn create_orchestrator_configured(
    backend: StoreBackend,
    configure: impl FnOnce(&mut OrchestratorConfig),
    agents: Vec<(&str, Arc<dyn Agent>)>,
) -> (TempDir, PlanOrchestrator) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(temp_dir.path(), backend);
    configure(&mut config);
    let mut builder = OrchestratorBuilder::new().with_config(config);
    for (capability, agent) in agents {
        builder = builder.with_agent(capability, agent);
    }
    let orchestrator = builder.build().await.expect("Failed to create orchestrator");
    (temp_dir, orchestrator)
}

/// Echoes the step id, its input and every dependency value.
pub struct Echo;

#[async_trait]
impl Agent for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute_step(
        &self,
        input: &StepInput,
        context: &StepContext,
    ) -> std::result::Result<AgentOutput, AgentError> {
        let deps: serde_json::Map<String, Value> = context
            .iter()
            .map(|(id, value)| {
                let rendered = match value.output() {
                    Some(output) => output.clone(),
                    None => json!("absent"),
                };
                (id.to_string(), rendered)
            })
            .collect();
        Ok(AgentOutput::success(json!({
            "step": input.step_id.as_str(),
            "input": Value::Object(input.parameters.clone()),
            "deps": deps,
        }))
        .with_source("echo://local"))
    }
}

/// Always fails and counts its invocations.
#[derive(Default)]
pub struct Failing {
    pub calls: AtomicU32,
}

#[async_trait]
impl Agent for Failing {
    async fn execute_step(
        &self,
        _input: &StepInput,
        _context: &StepContext,
    ) -> std::result::Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::Failed("boom".to_string()))
    }
}

/// Reports unavailability for the first `failures` calls, then succeeds.
pub struct Flaky {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl Flaky {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Agent for Flaky {
    async fn execute_step(
        &self,
        _input: &StepInput,
        _context: &StepContext,
    ) -> std::result::Result<AgentOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(AgentError::Unavailable("warming up".to_string()));
        }
        Ok(AgentOutput::success(json!({ "call": call + 1 })))
    }
}

/// Returns successive confidence scores, repeating the last one.
pub struct Scored {
    scores: Mutex<VecDeque<f64>>,
    pub calls: AtomicU32,
}

impl Scored {
    pub fn new(scores: &[f64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Agent for Scored {
    async fn execute_step(
        &self,
        _input: &StepInput,
        _context: &StepContext,
    ) -> std::result::Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let score = {
            let mut scores = self.scores.lock().unwrap();
            if scores.len() > 1 {
                scores.pop_front().unwrap()
            } else {
                *scores.front().unwrap()
            }
        };
        Ok(AgentOutput::success(json!("scored")).with_scores(score, 1.0))
    }
}

/// Announces every invocation and blocks until a permit is released.
pub struct Gated {
    started: mpsc::UnboundedSender<StepId>,
    release: Arc<Semaphore>,
}

impl Gated {
    /// The agent, a receiver of started step ids and the release valve.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StepId>, Arc<Semaphore>) {
        let (started, rx) = mpsc::unbounded_channel();
        let release = Arc::new(Semaphore::new(0));
        let agent = Arc::new(Self {
            started,
            release: Arc::clone(&release),
        });
        (agent, rx, release)
    }
}

#[async_trait]
impl Agent for Gated {
    async fn execute_step(
        &self,
        input: &StepInput,
        context: &StepContext,
    ) -> std::result::Result<AgentOutput, AgentError> {
        let _ = self.started.send(input.step_id.clone());
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        Echo.execute_step(input, context).await
    }
}

/// Delegates to another store but starts failing saves after `allowed` of
/// them succeeded.
pub struct FailingStore {
    inner: Arc<dyn CheckpointStore>,
    allowed: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn CheckpointStore>, allowed: usize) -> Self {
        Self {
            inner,
            allowed: AtomicUsize::new(allowed),
        }
    }

    /// Lets `count` more saves succeed.
    pub fn allow(&self, count: usize) {
        self.allowed.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckpointStore for FailingStore {
    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }

    async fn save(&self, plan: &Plan) -> Result<CheckpointId> {
        let remaining = self.allowed.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(OrchestratorError::persistence("disk full").build());
        }
        self.allowed.store(remaining - 1, Ordering::SeqCst);
        self.inner.save(plan).await
    }

    async fn load(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        self.inner.load(plan_id).await
    }

    async fn list(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        self.inner.list(plan_id).await
    }

    async fn checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        self.inner.checkpoint(plan_id, checkpoint_id).await
    }

    async fn plan_ids(&self) -> Result<Vec<PlanId>> {
        self.inner.plan_ids().await
    }
}

/// Delegates to another store; after `free` saves, every save announces
/// itself and waits until a permit is released.
pub struct HeldStore {
    inner: Arc<dyn CheckpointStore>,
    free: AtomicUsize,
    entered: mpsc::UnboundedSender<()>,
    release: Arc<Semaphore>,
}

impl HeldStore {
    /// The store, a receiver of held saves and the release valve.
    pub fn new(
        inner: Arc<dyn CheckpointStore>,
        free: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<()>, Arc<Semaphore>) {
        let (entered, rx) = mpsc::unbounded_channel();
        let release = Arc::new(Semaphore::new(0));
        let store = Arc::new(Self {
            inner,
            free: AtomicUsize::new(free),
            entered,
            release: Arc::clone(&release),
        });
        (store, rx, release)
    }
}

#[async_trait]
impl CheckpointStore for HeldStore {
    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }

    async fn save(&self, plan: &Plan) -> Result<CheckpointId> {
        let free = self.free.load(Ordering::SeqCst);
        if free > 0 {
            self.free.store(free - 1, Ordering::SeqCst);
        } else {
            let _ = self.entered.send(());
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }
        self.inner.save(plan).await
    }

    async fn load(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        self.inner.load(plan_id).await
    }

    async fn list(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        self.inner.list(plan_id).await
    }

    async fn checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        self.inner.checkpoint(plan_id, checkpoint_id).await
    }

    async fn plan_ids(&self) -> Result<Vec<PlanId>> {
        self.inner.plan_ids().await
    }
}
