//! Durable checkpoint storage.
//!
//! [`CheckpointStore`] is the persistence seam of the orchestrator. Two
//! backends implement it:
//!
//! - [`SqliteStore`]: relational rows plus an append-only checkpoint table.
//! - [`FileStore`]: one directory per plan with JSON files, used when SQLite
//!   cannot be opened.
//!
//! The backend is chosen once, by [`open_store`]. A write that fails later is
//! always reported to the caller; the store never silently switches backends
//! mid-run.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    task,
};

use crate::{
    error::{OrchestratorError, Result},
    models::{Checkpoint, CheckpointId, Plan, PlanId},
};

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Durable, append-only plan persistence.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> StoreBackend;

    /// Persists the plan's current state and appends a checkpoint of it.
    async fn save(&self, plan: &Plan) -> Result<CheckpointId>;

    /// Latest saved state of a plan.
    async fn load(&self, plan_id: &PlanId) -> Result<Option<Plan>>;

    /// Checkpoint ids of a plan, ascending.
    async fn list(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>>;

    /// A single checkpoint.
    async fn checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>>;

    /// Every stored plan id.
    async fn plan_ids(&self) -> Result<Vec<PlanId>>;

    /// The plan as captured by a checkpoint. Pure read.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::CheckpointNotFound` if the checkpoint does
    /// not exist.
    async fn restore(&self, plan_id: &PlanId, checkpoint_id: CheckpointId) -> Result<Plan> {
        self.checkpoint(plan_id, checkpoint_id)
            .await?
            .map(|checkpoint| checkpoint.snapshot)
            .ok_or_else(|| OrchestratorError::CheckpointNotFound {
                plan_id: plan_id.clone(),
                sequence: checkpoint_id,
            })
    }
}

/// Selectable storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite, degrading to files if the database cannot be opened
    #[default]
    Auto,
    Sqlite,
    File,
}

impl StoreBackend {
    /// Returns the string representation of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Auto => "auto",
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::File => "file",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(StoreBackend::Auto),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "file" | "files" => Ok(StoreBackend::File),
            _ => Err(format!("Invalid store backend: {s}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how plans are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for SQLite, root directory for the file store. Defaults
    /// to the XDG data directory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Configuration forcing `backend` at the default location.
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            path: None,
        }
    }

    /// Sets an explicit storage path.
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Opens the configured backend.
///
/// With [`StoreBackend::Auto`] a database that cannot be opened is logged and
/// replaced by a [`FileStore`] in a `checkpoints` directory next to it.
///
/// # Errors
///
/// Returns `OrchestratorError::Persistence` if the chosen backend cannot be
/// opened, or `OrchestratorError::XdgDirectory` if no default location exists.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.backend {
        StoreBackend::Sqlite => {
            let path = resolve_database_path(config.path.as_deref())?;
            Ok(Arc::new(SqliteStore::open(path).await?))
        }
        StoreBackend::File => {
            let root = match &config.path {
                Some(path) => path.clone(),
                None => default_checkpoint_dir()?,
            };
            Ok(Arc::new(FileStore::open(root).await?))
        }
        StoreBackend::Auto => {
            let db_path = resolve_database_path(config.path.as_deref())?;
            match SqliteStore::open(&db_path).await {
                Ok(store) => Ok(Arc::new(store)),
                Err(e) => {
                    let root = fallback_dir_for(&db_path)?;
                    log::warn!(
                        "SQLite store at {} unavailable ({e}); falling back to file store at {}",
                        db_path.display(),
                        root.display()
                    );
                    Ok(Arc::new(FileStore::open(root).await?))
                }
            }
        }
    }
}

/// Returns the default database path following the XDG Base Directory
/// specification: `$XDG_DATA_HOME/cadence/cadence.db`.
pub fn default_database_path() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("cadence")
        .place_data_file("cadence.db")
        .map_err(|e| OrchestratorError::XdgDirectory(e.to_string()))
}

/// Default root of the file store: `$XDG_DATA_HOME/cadence/checkpoints/`.
pub fn default_checkpoint_dir() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("cadence")
        .place_data_file("checkpoints")
        .map_err(|e| OrchestratorError::XdgDirectory(e.to_string()))
}

fn resolve_database_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => default_database_path(),
    }
}

fn fallback_dir_for(db_path: &Path) -> Result<PathBuf> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.join("checkpoints")),
        Some(_) => Ok(PathBuf::from("checkpoints")),
        None => default_checkpoint_dir(),
    }
}

/// Per-plan async locks serializing saves for the same plan.
#[derive(Debug, Default)]
pub(crate) struct PlanLocks {
    locks: Mutex<HashMap<PlanId, Arc<AsyncMutex<()>>>>,
}

impl PlanLocks {
    /// Waits until no other save for `plan_id` is in progress.
    pub(crate) async fn acquire(&self, plan_id: &PlanId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(plan_id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Runs blocking storage work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work).await.map_err(|e| {
        OrchestratorError::persistence("Storage task failed to complete").with_source(e)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>(), Ok(StoreBackend::Sqlite));
        assert_eq!("files".parse::<StoreBackend>(), Ok(StoreBackend::File));
        assert!("redis".parse::<StoreBackend>().is_err());
        assert_eq!(StoreBackend::default(), StoreBackend::Auto);
    }

    #[test]
    fn test_fallback_dir_sits_next_to_database() {
        let dir = fallback_dir_for(Path::new("/var/lib/cadence/cadence.db")).expect("path");
        assert_eq!(dir, PathBuf::from("/var/lib/cadence/checkpoints"));
        let relative = fallback_dir_for(Path::new("cadence.db")).expect("path");
        assert_eq!(relative, PathBuf::from("checkpoints"));
    }

    #[tokio::test]
    async fn test_plan_locks_serialize_same_plan() {
        let locks = Arc::new(PlanLocks::default());
        let id = PlanId::from("p");

        let guard = locks.acquire(&id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        // A different plan is not blocked.
        let _other = locks.acquire(&PlanId::from("q")).await;

        drop(guard);
        contender.await.expect("contender finishes");
    }

    #[test]
    fn test_store_config_deserializes_with_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"backend": "file"}"#).expect("valid config");
        assert_eq!(config, StoreConfig::new(StoreBackend::File));
    }
}
