//! Checks that the CLI prints exactly what the core Display implementations
//! render for the same stored state.

use std::{fs, path::Path, process::Command};

use cadence_core::{
    display::CheckpointHistory, CheckpointStore, PlanId, PlanReport, PlanStatus, SqliteStore,
};
use tempfile::TempDir;

const PLAN: &str = r#"{
  "id": "consistency",
  "goal": "Compare renderings",
  "steps": [
    { "id": "fetch", "required_capability": "echo", "input": { "url": "https://example.org" } },
    { "id": "merge", "required_capability": "merge", "dependencies": ["fetch"] }
  ]
}"#;

/// Run a CLI command and capture its stdout.
fn run_cli_command(db_path: &Path, args: &[&str]) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_cadence"))
        .arg("--no-color")
        .arg("--database-file")
        .arg(db_path)
        .args(args)
        .output()
        .expect("Failed to run CLI command");
    assert!(
        output.status.success(),
        "cadence {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("Invalid UTF-8 in CLI output")
}

async fn run_plan(temp_dir: &TempDir) -> SqliteStore {
    let db_path = temp_dir.path().join("test.db");
    let plan_path = temp_dir.path().join("plan.json");
    fs::write(&plan_path, PLAN).expect("Failed to write plan");

    let plan_arg = plan_path.to_str().expect("Non UTF-8 temp path");
    run_cli_command(&db_path, &["run", plan_arg]);

    SqliteStore::open(&db_path)
        .await
        .expect("Failed to open store")
}

#[tokio::test]
async fn test_show_matches_plan_display() {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let store = run_plan(&temp_dir).await;
    let plan_id = PlanId::from("consistency");

    let plan = store
        .load(&plan_id)
        .await
        .expect("Failed to load")
        .expect("Plan should exist");
    assert_eq!(plan.status, PlanStatus::Completed);

    let cli_output = run_cli_command(&temp_dir.path().join("test.db"), &["show", "consistency"]);
    assert_eq!(cli_output, plan.to_string());
}

#[tokio::test]
async fn test_list_matches_report_display() {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let store = run_plan(&temp_dir).await;

    let plan = store
        .load(&PlanId::from("consistency"))
        .await
        .expect("Failed to load")
        .expect("Plan should exist");

    let cli_output = run_cli_command(&temp_dir.path().join("test.db"), &["list"]);
    assert_eq!(cli_output, PlanReport::from(&plan).to_string());
}

#[tokio::test]
async fn test_checkpoints_match_history_display() {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let store = run_plan(&temp_dir).await;
    let plan_id = PlanId::from("consistency");

    let mut history = Vec::new();
    for id in store.list(&plan_id).await.expect("Failed to list") {
        history.push(
            store
                .checkpoint(&plan_id, id)
                .await
                .expect("Failed to read")
                .expect("Checkpoint should exist"),
        );
    }
    assert_eq!(history.len(), 3);

    let cli_output = run_cli_command(
        &temp_dir.path().join("test.db"),
        &["checkpoints", "consistency"],
    );
    assert_eq!(cli_output, CheckpointHistory(history).to_string());
}
