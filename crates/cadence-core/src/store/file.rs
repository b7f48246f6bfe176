//! Directory-per-plan JSON checkpoint store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<plan_id>/plan.json
//! <root>/<plan_id>/checkpoints/00000001.json
//! <root>/<plan_id>/checkpoints/00000002.json
//! ```
//!
//! Files are written to a temporary sibling and renamed into place, so a crash
//! never leaves a half-written checkpoint behind.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::{blocking, CheckpointStore, PlanLocks, StoreBackend};
use crate::{
    error::{OrchestratorError, PersistenceResultExt, Result},
    models::{Checkpoint, CheckpointId, Plan, PlanId},
};

const PLAN_FILE: &str = "plan.json";
const CHECKPOINT_DIR: &str = "checkpoints";

/// Checkpoint store writing JSON files below a root directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: PlanLocks,
}

impl FileStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| OrchestratorError::FileSystem {
            path: root.clone(),
            source: e,
        })?;
        log::debug!("Opened file store at {}", root.display());
        Ok(Self {
            root,
            locks: PlanLocks::default(),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plan_dir(&self, plan_id: &PlanId) -> Result<PathBuf> {
        let id = plan_id.as_str();
        let safe = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(|c: char| c == '/' || c == '\\')
            && !id.starts_with('.');
        if !safe {
            return Err(OrchestratorError::validation("plan_id")
                .with_reason(format!("'{id}' cannot be used as a directory name")));
        }
        Ok(self.root.join(id))
    }
}

fn checkpoint_file(dir: &Path, sequence: CheckpointId) -> PathBuf {
    dir.join(CHECKPOINT_DIR).join(format!("{sequence:08}.json"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .persist_context(&format!("Failed to decode {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OrchestratorError::persistence(format!(
            "Failed to read {}",
            path.display()
        ))
        .with_source(e)),
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    write().persist_context(&format!("Failed to write {}", path.display()))
}

fn checkpoint_sequences(dir: &Path) -> Result<Vec<CheckpointId>> {
    let entries = match fs::read_dir(dir.join(CHECKPOINT_DIR)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OrchestratorError::persistence(format!(
                "Failed to list checkpoints in {}",
                dir.display()
            ))
            .with_source(e))
        }
    };

    let mut sequences = Vec::new();
    for entry in entries {
        let path = entry
            .persist_context("Failed to read checkpoint directory entry")?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(sequence) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<CheckpointId>().ok())
        {
            sequences.push(sequence);
        }
    }
    sequences.sort_unstable();
    Ok(sequences)
}

#[async_trait]
impl CheckpointStore for FileStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    async fn save(&self, plan: &Plan) -> Result<CheckpointId> {
        let dir = self.plan_dir(&plan.id)?;
        let _guard = self.locks.acquire(&plan.id).await;
        let plan = plan.clone();

        blocking(move || {
            let sequence = checkpoint_sequences(&dir)?.last().copied().unwrap_or(0) + 1;
            let checkpoint = Checkpoint::capture(&plan, sequence);
            write_json_atomic(&checkpoint_file(&dir, sequence), &checkpoint)?;
            write_json_atomic(&dir.join(PLAN_FILE), &plan)?;
            Ok(sequence)
        })
        .await
    }

    async fn load(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        let path = self.plan_dir(plan_id)?.join(PLAN_FILE);
        blocking(move || read_json(&path)).await
    }

    async fn list(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        let dir = self.plan_dir(plan_id)?;
        blocking(move || checkpoint_sequences(&dir)).await
    }

    async fn checkpoint(
        &self,
        plan_id: &PlanId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        let path = checkpoint_file(&self.plan_dir(plan_id)?, checkpoint_id);
        blocking(move || read_json(&path)).await
    }

    async fn plan_ids(&self) -> Result<Vec<PlanId>> {
        let root = self.root.clone();
        blocking(move || {
            let entries = fs::read_dir(&root)
                .persist_context(&format!("Failed to list {}", root.display()))?;
            let mut ids = Vec::new();
            for entry in entries {
                let entry = entry.persist_context("Failed to read store directory entry")?;
                if entry.path().join(PLAN_FILE).is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        ids.push(PlanId::from(name));
                    }
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_unsafe_plan_ids_are_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::open(dir.path()).await.expect("store");
        for id in ["../escape", "a/b", "..", ".hidden", ""] {
            let err = store.load(&PlanId::from(id)).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::Validation { .. }), "{id}");
        }
    }

    #[tokio::test]
    async fn test_stray_files_are_ignored_when_listing() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::open(dir.path()).await.expect("store");
        let plan = Plan::new("stray").with_id("p1");
        store.save(&plan).await.expect("save");

        let checkpoints = dir.path().join("p1").join(CHECKPOINT_DIR);
        fs::write(checkpoints.join("notes.txt"), b"x").expect("write");
        fs::write(checkpoints.join("00000009.json.tmp"), b"{").expect("write");
        fs::create_dir(dir.path().join("not-a-plan")).expect("mkdir");

        assert_eq!(store.list(&plan.id).await.expect("list"), vec![1]);
        assert_eq!(store.plan_ids().await.expect("ids"), vec![plan.id.clone()]);
    }
}
