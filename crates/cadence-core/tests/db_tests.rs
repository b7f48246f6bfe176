use cadence_core::{
    models::{ResultStatus, StepResult, StepStatus},
    Database, FailurePolicy, Plan, PlanId, PlanStatus, Step, StepId,
};
use serde_json::json;
use tempfile::NamedTempFile;

/// Helper function to create a temporary database for testing
fn create_test_db() -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
    let db = Database::new(temp_file.path()).expect("Failed to create test database");
    (temp_file, db)
}

fn sample_plan() -> Plan {
    Plan::new("Audit the supplier contract")
        .with_id("audit")
        .with_failure_policy(FailurePolicy::SkipDependents)
        .with_step(
            Step::new("fetch", "search")
                .with_description("Find the contract")
                .with_input("query", json!("supplier contract"))
                .with_max_retries(1)
                .with_timeout_ms(500),
        )
        .with_step(Step::new("review", "llm").depends_on("fetch"))
}

#[test]
fn test_database_initialization() {
    let (temp_file, db) = create_test_db();

    assert!(temp_file.path().exists());
    assert_eq!(db.schema_version().expect("Failed to read version"), 1);
}

#[test]
fn test_save_and_get_plan() {
    let (_temp_file, mut db) = create_test_db();
    let plan = sample_plan();

    let checkpoint = db.save_plan(&plan).expect("Failed to save plan");
    assert_eq!(checkpoint, 1);

    let loaded = db
        .get_plan(&plan.id)
        .expect("Failed to get plan")
        .expect("Plan should exist");
    assert_eq!(loaded, plan);
    assert_eq!(loaded.failure_policy, FailurePolicy::SkipDependents);
    assert_eq!(loaded.steps[0].timeout_ms, Some(500));
    assert_eq!(loaded.steps[1].dependencies.len(), 1);
}

#[test]
fn test_get_missing_plan() {
    let (_temp_file, db) = create_test_db();

    let missing = db.get_plan(&PlanId::from("nope")).expect("Query failed");
    assert!(missing.is_none());
}

#[test]
fn test_step_results_are_persisted() {
    let (_temp_file, mut db) = create_test_db();
    let mut plan = sample_plan();
    db.save_plan(&plan).expect("Failed to save plan");

    plan.status = PlanStatus::Running;
    plan.steps[0].status = StepStatus::Completed;
    plan.steps[0].retry_count = 1;
    plan.steps[0].result = Some(StepResult {
        step_id: StepId::from("fetch"),
        output: json!({ "document": "contract.pdf" }),
        confidence_score: 0.9,
        quality_score: 0.75,
        sources: vec!["dms://contracts/42".to_string()],
        execution_time_ms: 120,
        status: ResultStatus::Success,
        error: None,
    });
    plan.steps[1].status = StepStatus::Failed;
    plan.steps[1].result = Some(StepResult::failed(StepId::from("review"), "timed out", 500));

    assert_eq!(db.save_plan(&plan).expect("Failed to save plan"), 2);

    let steps = db.get_steps(&plan.id).expect("Failed to get steps");
    assert_eq!(steps, plan.steps);
    assert_eq!(
        steps[1].result.as_ref().and_then(|r| r.error.as_deref()),
        Some("timed out")
    );
}

#[test]
fn test_steps_keep_their_order_after_insertion() {
    let (_temp_file, mut db) = create_test_db();
    let mut plan = sample_plan();
    let mut inserted = Step::new("extract", "parser").depends_on("fetch");
    inserted.sequence_index = 2;
    plan.steps.insert(1, inserted);

    db.save_plan(&plan).expect("Failed to save plan");

    let ids: Vec<String> = db
        .get_steps(&plan.id)
        .expect("Failed to get steps")
        .into_iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(ids, vec!["fetch", "extract", "review"]);
}

#[test]
fn test_checkpoints_capture_each_save() {
    let (_temp_file, mut db) = create_test_db();
    let mut plan = sample_plan();
    db.save_plan(&plan).expect("Failed to save plan");
    plan.steps[0].status = StepStatus::Completed;
    db.save_plan(&plan).expect("Failed to save plan");

    assert_eq!(db.list_checkpoints(&plan.id).expect("Failed to list"), vec![1, 2]);

    let first = db
        .get_checkpoint(&plan.id, 1)
        .expect("Failed to get checkpoint")
        .expect("Checkpoint should exist");
    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.snapshot.steps[0].status, StepStatus::Pending);

    let second = db
        .get_checkpoint(&plan.id, 2)
        .expect("Failed to get checkpoint")
        .expect("Checkpoint should exist");
    assert_eq!(second.snapshot.steps[0].status, StepStatus::Completed);

    assert!(db.get_checkpoint(&plan.id, 3).expect("Query failed").is_none());
}

#[test]
fn test_checkpoints_cannot_be_updated() {
    let (temp_file, mut db) = create_test_db();
    let plan = sample_plan();
    db.save_plan(&plan).expect("Failed to save plan");

    let connection = rusqlite::Connection::open(temp_file.path()).expect("Failed to open");
    let result = connection.execute(
        "UPDATE checkpoints SET snapshot = '{}' WHERE plan_id = ?1",
        ["audit"],
    );
    assert!(result.is_err());

    let checkpoint = db
        .get_checkpoint(&plan.id, 1)
        .expect("Failed to get checkpoint")
        .expect("Checkpoint should exist");
    assert_eq!(checkpoint.snapshot, plan);
}

#[test]
fn test_list_plan_ids() {
    let (_temp_file, mut db) = create_test_db();
    db.save_plan(&Plan::new("first").with_id("a"))
        .expect("Failed to save plan");
    db.save_plan(&Plan::new("second").with_id("b"))
        .expect("Failed to save plan");

    let ids = db.list_plan_ids().expect("Failed to list plans");
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&PlanId::from("a")));
    assert!(ids.contains(&PlanId::from("b")));
}
