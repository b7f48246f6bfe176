//! SQLite-backed checkpoint store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{blocking, CheckpointStore, PlanLocks, StoreBackend};
use crate::{
    db::Database,
    error::{OrchestratorError, Result},
    models::{Checkpoint, CheckpointId, Plan, PlanId},
};

/// Checkpoint store over a SQLite database file.
///
/// Every operation opens its own connection on a blocking thread, so the store
/// itself is cheap to share.
#[derive(Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
    locks: PlanLocks,
}

impl SqliteStore {
    /// Opens the database at `path`, creating it and its parent directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::FileSystem` if the parent directory cannot be
    /// created and `OrchestratorError::Persistence` if the database cannot be
    /// opened or initialized.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| OrchestratorError::FileSystem {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let init_path = db_path.clone();
        blocking(move || Database::new(&init_path).map(drop)).await?;

        log::debug!("Opened SQLite store at {}", db_path.display());
        Ok(Self {
            db_path,
            locks: PlanLocks::default(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Sqlite
    }

    async fn save(&self, plan: &Plan) -> Result<CheckpointId> {
        let _guard = self.locks.acquire(&plan.id).await;
        let db_path = self.db_path.clone();
        let plan = plan.clone();

        blocking(move || {
            let mut db = Database::new(&db_path)?;
            db.save_plan(&plan)
        })
        .await
    }

    async fn load(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        let db_path = self.db_path.clone();
        let plan_id = plan_id.clone();

        blocking(move || {
            let db = Database::new(&db_path)?;
            db.get_plan(&plan_id)
        })
        .await
    }

    async fn list(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        let db_path = self.db_path.clone();
        let plan_id = plan_id.clone();

        blocking(move || {
            let db = Database::new(&db_path)?;
            db.list_checkpoints(&plan_id)
        })
        .await
    }

    async fn checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        let db_path = self.db_path.clone();
        let plan_id = plan_id.clone();

        blocking(move || {
            let db = Database::new(&db_path)?;
            db.get_checkpoint(&plan_id, checkpoint_id)
        })
        .await
    }

    async fn plan_ids(&self) -> Result<Vec<PlanId>> {
        let db_path = self.db_path.clone();

        blocking(move || {
            let db = Database::new(&db_path)?;
            db.list_plan_ids()
        })
        .await
    }
}
