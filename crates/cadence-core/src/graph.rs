//! Dependency validation and wave scheduling.
//!
//! A wave is one topological level of the step graph: wave *k* holds exactly
//! the steps whose dependencies all sit in waves before *k*. Steps inside a
//! wave never depend on each other and may run concurrently. Levels are
//! computed with Kahn's algorithm; whatever cannot be levelled is on (or
//! behind) a cycle.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    error::{OrchestratorError, Result},
    models::{Step, StepId},
};

/// One topological level of the step graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// Zero-based position of the wave in the schedule
    pub index: usize,
    /// Steps in the wave, ordered by sequence index
    pub steps: Vec<StepId>,
}

impl Wave {
    /// Number of steps in the wave.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the wave has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Validates step graphs and orders them into waves.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyGraphBuilder;

impl DependencyGraphBuilder {
    /// Orders every step into waves.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Validation` for duplicate step ids or
    /// dependencies on unknown steps, and `OrchestratorError::CyclicDependency`
    /// when the graph has a cycle (including a step depending on itself).
    pub fn build(steps: &[Step]) -> Result<Vec<Wave>> {
        Self::validate(steps)?;
        Self::level(steps, |_| true)
    }

    /// Orders the non-terminal steps into waves.
    ///
    /// The whole step set is validated first. Dependencies on terminal steps
    /// count as already satisfied, so the first returned wave is whatever can
    /// run right now.
    pub fn remaining(steps: &[Step]) -> Result<Vec<Wave>> {
        Self::validate(steps)?;
        Self::level(steps, |step| !step.is_terminal())
    }

    /// Checks ids, dependency references and acyclicity.
    pub fn validate(steps: &[Step]) -> Result<()> {
        let mut seen: HashSet<&StepId> = HashSet::with_capacity(steps.len());
        for step in steps {
            if !seen.insert(&step.id) {
                return Err(OrchestratorError::validation("steps")
                    .with_reason(format!("duplicate step id '{}'", step.id)));
            }
        }

        for step in steps {
            if step.dependencies.contains(&step.id) {
                return Err(OrchestratorError::CyclicDependency {
                    steps: vec![step.id.clone()],
                });
            }
            if let Some(missing) = step.dependencies.iter().find(|dep| !seen.contains(dep)) {
                return Err(OrchestratorError::validation("dependencies").with_reason(format!(
                    "step '{}' depends on unknown step '{missing}'",
                    step.id
                )));
            }
        }

        Self::level(steps, |_| true).map(|_| ())
    }

    /// Kahn's algorithm over the steps accepted by `include`.
    fn level<F>(steps: &[Step], include: F) -> Result<Vec<Wave>>
    where
        F: Fn(&Step) -> bool,
    {
        let included: Vec<(usize, &Step)> = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| include(step))
            .collect();
        let members: HashSet<&StepId> = included.iter().map(|(_, s)| &s.id).collect();

        let mut in_degree: HashMap<&StepId, usize> = HashMap::with_capacity(included.len());
        let mut dependents: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
        let mut order_key: HashMap<&StepId, (u32, usize)> = HashMap::new();

        for &(position, step) in &included {
            order_key.insert(&step.id, (step.sequence_index, position));
            let degree = step
                .dependencies
                .iter()
                .filter(|dep| members.contains(dep))
                .inspect(|dep| dependents.entry(*dep).or_default().push(&step.id))
                .count();
            in_degree.insert(&step.id, degree);
        }

        let sort_level = |level: &mut Vec<&StepId>| {
            level.sort_by_key(|id| order_key.get(*id).copied().unwrap_or((u32::MAX, usize::MAX)));
        };

        let mut current: Vec<&StepId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        sort_level(&mut current);

        let mut waves = Vec::new();
        let mut placed = 0usize;

        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for dependent in dependents.get(*id).map(Vec::as_slice).unwrap_or_default() {
                    if let Some(degree) = in_degree.get_mut(*dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            placed += current.len();
            waves.push(Wave {
                index: waves.len(),
                steps: current.iter().map(|id| (*id).clone()).collect(),
            });
            sort_level(&mut next);
            current = next;
        }

        if placed < included.len() {
            let mut stuck: Vec<&StepId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| *id)
                .collect();
            sort_level(&mut stuck);
            return Err(OrchestratorError::CyclicDependency {
                steps: stuck.into_iter().cloned().collect(),
            });
        }

        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Plan, StepStatus};

    fn ids(wave: &Wave) -> Vec<&str> {
        wave.steps.iter().map(StepId::as_str).collect()
    }

    fn assert_topological(steps: &[Step], waves: &[Wave]) {
        let wave_of: HashMap<&StepId, usize> = waves
            .iter()
            .flat_map(|w| w.steps.iter().map(move |id| (id, w.index)))
            .collect();
        for step in steps {
            let own = wave_of[&step.id];
            for dep in &step.dependencies {
                assert!(wave_of[dep] < own, "{} must run after {}", step.id, dep);
            }
        }
    }

    #[test]
    fn test_empty_steps_yield_no_waves() {
        let waves = DependencyGraphBuilder::build(&[]).expect("empty graph is valid");
        assert!(waves.is_empty());
    }

    #[test]
    fn test_single_step_is_wave_zero() {
        let steps = vec![Step::new("only", "echo")];
        let waves = DependencyGraphBuilder::build(&steps).expect("valid graph");
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].index, 0);
        assert_eq!(ids(&waves[0]), vec!["only"]);
    }

    #[test]
    fn test_fan_out_ignores_declaration_order() {
        // C declared before B; both depend on A.
        let plan = Plan::new("fan out")
            .with_step(Step::new("C", "echo").depends_on("A"))
            .with_step(Step::new("A", "echo"))
            .with_step(Step::new("B", "echo").depends_on("A"));

        let waves = DependencyGraphBuilder::build(&plan.steps).expect("valid graph");
        assert_eq!(waves.len(), 2);
        assert_eq!(ids(&waves[0]), vec!["A"]);
        let mut second = ids(&waves[1]);
        second.sort_unstable();
        assert_eq!(second, vec!["B", "C"]);
    }

    #[test]
    fn test_wave_members_ordered_by_sequence_index() {
        let plan = Plan::new("ties")
            .with_step(Step::new("z", "echo"))
            .with_step(Step::new("y", "echo"))
            .with_step(Step::new("x", "echo"));
        let waves = DependencyGraphBuilder::build(&plan.steps).expect("valid graph");
        assert_eq!(ids(&waves[0]), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_levels_follow_longest_path() {
        let plan = Plan::new("mixed depth")
            .with_step(Step::new("a", "echo"))
            .with_step(Step::new("b", "echo").depends_on("a"))
            .with_step(Step::new("c", "echo").depends_on("b"))
            .with_step(Step::new("d", "echo").depends_on("a").depends_on("c"))
            .with_step(Step::new("e", "echo"));

        let waves = DependencyGraphBuilder::build(&plan.steps).expect("valid graph");
        assert_eq!(waves.len(), 4);
        assert_eq!(ids(&waves[0]), vec!["a", "e"]);
        assert_eq!(ids(&waves[3]), vec!["d"]);
        assert_topological(&plan.steps, &waves);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let plan = Plan::new("cycle")
            .with_step(Step::new("a", "echo").depends_on("c"))
            .with_step(Step::new("b", "echo").depends_on("a"))
            .with_step(Step::new("c", "echo").depends_on("b"))
            .with_step(Step::new("free", "echo"));

        match DependencyGraphBuilder::build(&plan.steps) {
            Err(OrchestratorError::CyclicDependency { steps }) => {
                assert_eq!(
                    steps,
                    vec![StepId::from("a"), StepId::from("b"), StepId::from("c")]
                );
            }
            other => panic!("expected cyclic dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![Step::new("loop", "echo").depends_on("loop")];
        let err = DependencyGraphBuilder::build(&steps).unwrap_err();
        assert!(matches!(err, OrchestratorError::CyclicDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let steps = vec![Step::new("a", "echo").depends_on("ghost")];
        let err = DependencyGraphBuilder::build(&steps).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let steps = vec![Step::new("a", "echo"), Step::new("a", "other")];
        let err = DependencyGraphBuilder::build(&steps).unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'a'"));
    }

    #[test]
    fn test_remaining_skips_terminal_steps() {
        let mut plan = Plan::new("resume")
            .with_step(Step::new("a", "echo"))
            .with_step(Step::new("b", "echo").depends_on("a"))
            .with_step(Step::new("c", "echo").depends_on("b"));
        plan.steps[0].status = StepStatus::Completed;

        let waves = DependencyGraphBuilder::remaining(&plan.steps).expect("valid graph");
        assert_eq!(waves.len(), 2);
        assert_eq!(ids(&waves[0]), vec!["b"]);
        assert_eq!(ids(&waves[1]), vec!["c"]);
    }

    #[test]
    fn test_remaining_still_detects_cycles_through_terminal_steps() {
        let mut plan = Plan::new("bad resume")
            .with_step(Step::new("a", "echo").depends_on("b"))
            .with_step(Step::new("b", "echo").depends_on("a"));
        plan.steps[0].status = StepStatus::Completed;

        let err = DependencyGraphBuilder::remaining(&plan.steps).unwrap_err();
        assert!(matches!(err, OrchestratorError::CyclicDependency { .. }));
    }

    #[test]
    fn test_generated_layered_graphs_are_topological() {
        // Deterministic pseudo-random DAGs: edges only point backwards.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for size in 1..30usize {
            let mut plan = Plan::new("generated");
            for i in 0..size {
                let mut step = Step::new(format!("s{i}"), "echo");
                for j in 0..i {
                    seed ^= seed << 13;
                    seed ^= seed >> 7;
                    seed ^= seed << 17;
                    if seed % 4 == 0 {
                        step = step.depends_on(format!("s{j}"));
                    }
                }
                plan.push_step(step);
            }
            let waves = DependencyGraphBuilder::build(&plan.steps).expect("acyclic");
            let placed: usize = waves.iter().map(Wave::len).sum();
            assert_eq!(placed, size);
            assert_topological(&plan.steps, &waves);
        }
    }
}
