#[cfg(test)]
mod model_tests {
    use serde_json::json;

    use crate::models::{
        DependencyOutput, FailurePolicy, Plan, PlanReport, PlanStatus, ResultStatus, Step,
        StepId, StepResult, StepStatus,
    };

    fn completed(step: &mut Step, output: serde_json::Value) {
        step.status = StepStatus::Completed;
        step.result = Some(StepResult {
            step_id: step.id.clone(),
            output,
            confidence_score: 0.9,
            quality_score: 0.9,
            sources: vec!["doc-1".to_string()],
            execution_time_ms: 5,
            status: ResultStatus::Success,
            error: None,
        });
    }

    fn diamond() -> Plan {
        Plan::new("diamond")
            .with_id("plan-1")
            .with_step(Step::new("a", "echo"))
            .with_step(Step::new("b", "echo").depends_on("a"))
            .with_step(Step::new("c", "echo").depends_on("a"))
            .with_step(Step::new("d", "echo").depends_on("b").depends_on("c"))
    }

    #[test]
    fn test_push_step_assigns_sequence_indices() {
        let plan = diamond();
        let indices: Vec<u32> = plan.steps.iter().map(|s| s.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(plan.next_sequence_index(), 4);
    }

    #[test]
    fn test_progress_counts_terminal_steps() {
        let mut plan = diamond();
        assert_eq!(plan.progress_percentage(), 0.0);

        plan.steps[0].status = StepStatus::Completed;
        plan.steps[1].status = StepStatus::Failed;
        plan.steps[2].status = StepStatus::Skipped;
        plan.steps[3].status = StepStatus::Running;

        let counts = plan.counts();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.terminal(), 3);
        assert_eq!(counts.pending, 1);
        assert_eq!(plan.progress_percentage(), 75.0);
    }

    #[test]
    fn test_empty_plan_progress_is_complete() {
        let plan = Plan::new("nothing to do");
        assert_eq!(plan.progress_percentage(), 100.0);
        assert!(plan.is_settled());
    }

    #[test]
    fn test_dependents_are_transitive_and_ordered() {
        let plan = diamond();
        let dependents = plan.dependents_of(&StepId::from("a"));
        assert_eq!(
            dependents,
            vec![StepId::from("b"), StepId::from("c"), StepId::from("d")]
        );
        assert!(plan.dependents_of(&StepId::from("d")).is_empty());
    }

    #[test]
    fn test_context_marks_unfinished_dependencies_absent() {
        let mut plan = diamond();
        completed(&mut plan.steps[1], json!({"text": "from b"}));
        plan.steps[2].status = StepStatus::Failed;
        plan.steps[2].result = Some(StepResult::failed(StepId::from("c"), "boom", 3));

        let d = plan.steps[3].clone();
        let context = plan.context_for(&d);

        assert_eq!(
            context.get(&StepId::from("b")).and_then(DependencyOutput::output),
            Some(&json!({"text": "from b"}))
        );
        let absent = context.get(&StepId::from("c")).expect("c in context");
        assert!(absent.is_absent());
        assert!(matches!(absent, DependencyOutput::Absent { reason } if reason.contains("boom")));
    }

    #[test]
    fn test_report_lists_failures() {
        let mut plan = diamond();
        plan.status = PlanStatus::Failed;
        completed(&mut plan.steps[0], json!(1));
        plan.steps[1].status = StepStatus::Failed;
        plan.steps[1].result = Some(StepResult::failed(StepId::from("b"), "timeout", 10));
        plan.steps[2].status = StepStatus::Skipped;
        plan.steps[3].status = StepStatus::Skipped;

        let report = PlanReport::from(&plan);
        assert!(!report.succeeded());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step_id, StepId::from("b"));
        assert_eq!(report.failures[0].reason, "timeout");
        assert_eq!(report.counts.skipped, 2);
        assert_eq!(report.progress_percentage, 100.0);
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let plan: Plan = serde_json::from_value(json!({
            "goal": "from json",
            "steps": [
                {"id": "a", "required_capability": "echo"},
                {"id": "b", "required_capability": "echo", "dependencies": ["a"]}
            ]
        }))
        .expect("valid plan json");

        assert!(!plan.id.as_str().is_empty());
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.failure_policy, FailurePolicy::AbortOnFailure);
        assert_eq!(plan.steps[1].dependencies.len(), 1);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [
            StepStatus::Pending,
            StepStatus::Ready,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
            StepStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<StepStatus>(), Ok(status));
        }
        assert_eq!("canceled".parse::<PlanStatus>(), Ok(PlanStatus::Cancelled));
        assert_eq!(
            "skip-dependents".parse::<FailurePolicy>(),
            Ok(FailurePolicy::SkipDependents)
        );
        assert!("bogus".parse::<ResultStatus>().is_err());
    }
}
