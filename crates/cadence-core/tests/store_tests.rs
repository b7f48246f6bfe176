use std::{fs, path::Path, sync::Arc};

use cadence_core::{
    models::{ResultStatus, StepResult, StepStatus},
    store::{open_store, StoreConfig},
    CheckpointStore, FileStore, OrchestratorError, Plan, PlanId, PlanStatus, SqliteStore, Step,
    StepId, StoreBackend,
};
use serde_json::json;
use tempfile::TempDir;

async fn open(backend: StoreBackend, dir: &Path) -> Arc<dyn CheckpointStore> {
    match backend {
        StoreBackend::File => Arc::new(
            FileStore::open(dir.join("checkpoints"))
                .await
                .expect("Failed to open file store"),
        ),
        _ => Arc::new(
            SqliteStore::open(dir.join("cadence.db"))
                .await
                .expect("Failed to open sqlite store"),
        ),
    }
}

fn sample_plan() -> Plan {
    Plan::new("Collect case law")
        .with_id("case-law")
        .with_step(Step::new("search", "legal_search").with_input("query", json!("tenancy")))
        .with_step(Step::new("summarise", "llm").depends_on("search"))
}

fn complete_first_step(plan: &mut Plan) {
    plan.status = PlanStatus::Running;
    plan.steps[0].status = StepStatus::Completed;
    plan.steps[0].result = Some(StepResult {
        step_id: StepId::from("search"),
        output: json!(["case 1", "case 2"]),
        confidence_score: 0.8,
        quality_score: 1.0,
        sources: vec!["court://registry".to_string()],
        execution_time_ms: 12,
        status: ResultStatus::Success,
        error: None,
    });
}

async fn roundtrip(backend: StoreBackend) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = open(backend, dir.path()).await;
    let mut plan = sample_plan();

    assert_eq!(store.save(&plan).await.expect("Failed to save"), 1);
    complete_first_step(&mut plan);
    assert_eq!(store.save(&plan).await.expect("Failed to save"), 2);

    let loaded = store
        .load(&plan.id)
        .await
        .expect("Failed to load")
        .expect("Plan should exist");
    assert_eq!(loaded, plan);
    assert_eq!(store.list(&plan.id).await.expect("Failed to list"), vec![1, 2]);
    assert_eq!(store.backend(), backend);
}

async fn restore_is_idempotent(backend: StoreBackend) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = open(backend, dir.path()).await;
    let mut plan = sample_plan();
    store.save(&plan).await.expect("Failed to save");
    complete_first_step(&mut plan);
    store.save(&plan).await.expect("Failed to save");

    let first = store.restore(&plan.id, 1).await.expect("Failed to restore");
    let again = store.restore(&plan.id, 1).await.expect("Failed to restore");
    assert_eq!(first, again);
    assert_eq!(first.steps[0].status, StepStatus::Pending);
    assert!(first.steps[0].result.is_none());

    // Restoring never writes.
    assert_eq!(store.list(&plan.id).await.expect("Failed to list"), vec![1, 2]);
}

async fn missing_entries(backend: StoreBackend) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = open(backend, dir.path()).await;
    let unknown = PlanId::from("unknown");

    assert!(store.load(&unknown).await.expect("Failed to load").is_none());
    assert!(store.list(&unknown).await.expect("Failed to list").is_empty());

    let plan = sample_plan();
    store.save(&plan).await.expect("Failed to save");
    let err = store.restore(&plan.id, 7).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::CheckpointNotFound { sequence: 7, .. }
    ));
}

async fn checkpoints_are_immutable(backend: StoreBackend) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = open(backend, dir.path()).await;
    let mut plan = sample_plan();
    store.save(&plan).await.expect("Failed to save");
    let before = store
        .checkpoint(&plan.id, 1)
        .await
        .expect("Failed to read")
        .expect("Checkpoint should exist");

    complete_first_step(&mut plan);
    plan.steps.pop();
    store.save(&plan).await.expect("Failed to save");

    let after = store
        .checkpoint(&plan.id, 1)
        .await
        .expect("Failed to read")
        .expect("Checkpoint should exist");
    assert_eq!(before, after);
    assert_eq!(after.snapshot.steps.len(), 2);
}

async fn plan_ids(backend: StoreBackend) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = open(backend, dir.path()).await;
    store
        .save(&Plan::new("one").with_id("one"))
        .await
        .expect("Failed to save");
    store
        .save(&Plan::new("two").with_id("two"))
        .await
        .expect("Failed to save");

    let mut ids = store.plan_ids().await.expect("Failed to list plans");
    ids.sort();
    assert_eq!(ids, vec![PlanId::from("one"), PlanId::from("two")]);
}

#[tokio::test]
async fn test_sqlite_roundtrip() {
    roundtrip(StoreBackend::Sqlite).await;
}

#[tokio::test]
async fn test_file_roundtrip() {
    roundtrip(StoreBackend::File).await;
}

#[tokio::test]
async fn test_sqlite_restore_is_idempotent() {
    restore_is_idempotent(StoreBackend::Sqlite).await;
}

#[tokio::test]
async fn test_file_restore_is_idempotent() {
    restore_is_idempotent(StoreBackend::File).await;
}

#[tokio::test]
async fn test_sqlite_missing_entries() {
    missing_entries(StoreBackend::Sqlite).await;
}

#[tokio::test]
async fn test_file_missing_entries() {
    missing_entries(StoreBackend::File).await;
}

#[tokio::test]
async fn test_sqlite_checkpoints_are_immutable() {
    checkpoints_are_immutable(StoreBackend::Sqlite).await;
}

#[tokio::test]
async fn test_file_checkpoints_are_immutable() {
    checkpoints_are_immutable(StoreBackend::File).await;
}

#[tokio::test]
async fn test_sqlite_plan_ids() {
    plan_ids(StoreBackend::Sqlite).await;
}

#[tokio::test]
async fn test_file_plan_ids() {
    plan_ids(StoreBackend::File).await;
}

#[tokio::test]
async fn test_file_store_layout() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = FileStore::open(dir.path())
        .await
        .expect("Failed to open file store");
    store.save(&sample_plan()).await.expect("Failed to save");

    let plan_dir = dir.path().join("case-law");
    assert!(plan_dir.join("plan.json").is_file());
    assert!(plan_dir.join("checkpoints").join("00000001.json").is_file());
}

#[tokio::test]
async fn test_file_store_rejects_path_like_ids() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = FileStore::open(dir.path())
        .await
        .expect("Failed to open file store");

    let err = store
        .save(&Plan::new("escape").with_id("../outside"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
}

#[tokio::test]
async fn test_auto_backend_prefers_sqlite() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = StoreConfig::new(StoreBackend::Auto).with_path(dir.path().join("cadence.db"));

    let store = open_store(&config).await.expect("Failed to open store");
    assert_eq!(store.backend(), StoreBackend::Sqlite);
}

#[tokio::test]
async fn test_auto_backend_falls_back_to_files() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    // A directory where the database file should be makes SQLite unusable.
    let db_path = dir.path().join("cadence.db");
    fs::create_dir_all(&db_path).expect("Failed to create dir");
    let config = StoreConfig::new(StoreBackend::Auto).with_path(&db_path);

    let store = open_store(&config).await.expect("Failed to open store");
    assert_eq!(store.backend(), StoreBackend::File);

    store.save(&sample_plan()).await.expect("Failed to save");
    assert!(dir
        .path()
        .join("checkpoints")
        .join("case-law")
        .join("plan.json")
        .is_file());
}

#[tokio::test]
async fn test_forced_sqlite_backend_reports_errors() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("cadence.db");
    fs::create_dir_all(&db_path).expect("Failed to create dir");
    let config = StoreConfig::new(StoreBackend::Sqlite).with_path(&db_path);

    let err = open_store(&config)
        .await
        .err()
        .expect("Opening a directory as a database should fail");
    assert!(err.is_persistence());
}
