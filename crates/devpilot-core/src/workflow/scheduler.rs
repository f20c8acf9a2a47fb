//! Dependency scheduler — topological ordering and fixed-point wave planning.
//!
//! Every planning round revisits every unresolved step. A step is eligible
//! once all of its `dependsOn` ids are completed; a step whose dependency is
//! permanently failed or skipped can never run, and that verdict is
//! propagated transitively until nothing changes. Nothing is ever dropped
//! just because it was not ready in an earlier round.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::ValidationError;
use crate::models::{WorkflowContext, WorkflowStep};

/// Read-only view of which steps have reached a terminal status.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub completed: &'a BTreeSet<String>,
    pub failed: &'a BTreeSet<String>,
    pub skipped: &'a BTreeSet<String>,
}

impl<'a> From<&'a WorkflowContext> for Progress<'a> {
    fn from(ctx: &'a WorkflowContext) -> Self {
        Self {
            completed: &ctx.completed_steps,
            failed: &ctx.failed_steps,
            skipped: &ctx.skipped_steps,
        }
    }
}

impl Progress<'_> {
    fn is_resolved(&self, id: &str) -> bool {
        self.completed.contains(id) || self.failed.contains(id) || self.skipped.contains(id)
    }
}

/// Outcome of one planning round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePlan {
    /// Steps to dispatch now, in declaration order
    pub ready: Vec<String>,
    /// Steps that can never run, with the reason, in declaration order
    pub skipped: Vec<(String, String)>,
}

impl WavePlan {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.skipped.is_empty()
    }
}

pub struct DependencyScheduler<'a> {
    steps: &'a [WorkflowStep],
    /// The fallback step only runs on demand
    reserved: Option<&'a str>,
}

impl<'a> DependencyScheduler<'a> {
    pub fn new(steps: &'a [WorkflowStep], reserved: Option<&'a str>) -> Self {
        Self { steps, reserved }
    }

    fn schedulable(&self) -> impl Iterator<Item = &'a WorkflowStep> + '_ {
        let reserved = self.reserved;
        self.steps
            .iter()
            .filter(move |s| Some(s.id.as_str()) != reserved)
    }

    /// Compute the next wave and the steps that became unreachable.
    pub fn plan(&self, progress: Progress<'_>) -> WavePlan {
        let mut doomed: BTreeMap<&str, String> = BTreeMap::new();

        loop {
            let mut changed = false;
            for step in self.schedulable() {
                if progress.is_resolved(&step.id) || doomed.contains_key(step.id.as_str()) {
                    continue;
                }
                let blocked_by = step.depends_on.iter().find_map(|dep| {
                    if progress.failed.contains(dep) {
                        Some(format!("dependency '{}' failed", dep))
                    } else if progress.skipped.contains(dep) || doomed.contains_key(dep.as_str()) {
                        Some(format!("dependency '{}' was skipped", dep))
                    } else {
                        None
                    }
                });
                if let Some(reason) = blocked_by {
                    doomed.insert(step.id.as_str(), reason);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut plan = WavePlan::default();
        for step in self.schedulable() {
            if progress.is_resolved(&step.id) {
                continue;
            }
            if let Some(reason) = doomed.remove(step.id.as_str()) {
                plan.skipped.push((step.id.clone(), reason));
                continue;
            }
            if step.depends_on.iter().all(|d| progress.completed.contains(d)) {
                plan.ready.push(step.id.clone());
            }
        }
        plan
    }

    /// Steps that have not reached a terminal status.
    pub fn unresolved(&self, progress: Progress<'_>) -> Vec<String> {
        self.schedulable()
            .filter(|s| !progress.is_resolved(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Kahn's algorithm; ties are broken by declaration order.
pub fn topological_order(steps: &[WorkflowStep]) -> Result<Vec<String>, ValidationError> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; steps.len()];
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(ValidationError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            };
            indegree[i] += 1;
            downstream[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..steps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(i) = ready.pop_first() {
        order.push(steps[i].id.clone());
        for &next in &downstream[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != steps.len() {
        let stuck = steps
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, s)| s.id.clone())
            .collect();
        return Err(ValidationError::Cycle(stuck));
    }
    Ok(order)
}

/// Wave partition assuming every step completes.
pub fn preview_waves(
    steps: &[WorkflowStep],
    reserved: Option<&str>,
) -> Result<Vec<Vec<String>>, ValidationError> {
    topological_order(steps)?;

    let scheduler = DependencyScheduler::new(steps, reserved);
    let mut completed = BTreeSet::new();
    let empty = BTreeSet::new();
    let mut waves = Vec::new();
    loop {
        let plan = scheduler.plan(Progress {
            completed: &completed,
            failed: &empty,
            skipped: &empty,
        });
        if plan.ready.is_empty() {
            break;
        }
        completed.extend(plan.ready.iter().cloned());
        waves.push(plan.ready);
    }
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            name: id.to_string(),
            agent: "researcher".to_string(),
            input: serde_json::json!({}),
            timeout: None,
            retries: None,
            retry_delay: None,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            input_mapping: Default::default(),
            condition: None,
        }
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diamond_runs_in_three_waves() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        let waves = preview_waves(&steps, None).unwrap();
        assert_eq!(
            waves,
            vec![vec!["a".to_string()], vec!["b".into(), "c".into()], vec!["d".into()]]
        );
    }

    #[test]
    fn test_steps_declared_before_their_dependencies_still_run() {
        // A forward-only walk would drop "report" because it is not ready when first visited.
        let steps = vec![step("report", &["analyze"]), step("analyze", &["fetch"]), step("fetch", &[])];
        let waves = preview_waves(&steps, None).unwrap();
        assert_eq!(
            waves,
            vec![vec!["fetch".to_string()], vec!["analyze".into()], vec!["report".into()]]
        );
        assert_eq!(
            topological_order(&steps).unwrap(),
            vec!["fetch".to_string(), "analyze".into(), "report".into()]
        );
    }

    #[test]
    fn test_failure_propagates_skips_transitively() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["b"]),
            step("e", &[]),
        ];
        let scheduler = DependencyScheduler::new(&steps, None);
        let completed = set(&[]);
        let failed = set(&["a"]);
        let skipped = set(&[]);
        let plan = scheduler.plan(Progress {
            completed: &completed,
            failed: &failed,
            skipped: &skipped,
        });
        assert_eq!(plan.ready, vec!["e".to_string()]);
        assert_eq!(
            plan.skipped,
            vec![
                ("b".to_string(), "dependency 'a' failed".to_string()),
                ("c".to_string(), "dependency 'b' was skipped".to_string()),
            ]
        );
    }

    #[test]
    fn test_join_waits_for_every_branch() {
        let steps = vec![step("a", &[]), step("b", &[]), step("join", &["a", "b"])];
        let scheduler = DependencyScheduler::new(&steps, None);
        let completed = set(&["a"]);
        let empty = set(&[]);
        let plan = scheduler.plan(Progress {
            completed: &completed,
            failed: &empty,
            skipped: &empty,
        });
        assert_eq!(plan.ready, vec!["b".to_string()]);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_reserved_step_is_never_scheduled() {
        let steps = vec![step("a", &[]), step("fallback", &[])];
        let waves = preview_waves(&steps, Some("fallback")).unwrap();
        assert_eq!(waves, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let steps = vec![step("a", &["b"]), step("b", &["a"]), step("c", &[])];
        match topological_order(&steps) {
            Err(ValidationError::Cycle(ids)) => assert_eq!(ids, vec!["a".to_string(), "b".into()]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_order_respects_dependencies_for_generated_dags() {
        // Deterministic LCG so failures are reproducible without extra crates.
        let mut seed: u64 = 0x5eed;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for _ in 0..50 {
            let n = 2 + next() % 12;
            let mut steps: Vec<WorkflowStep> = (0..n)
                .map(|i| {
                    let deps: Vec<String> = (0..i)
                        .filter(|_| next() % 3 == 0)
                        .map(|d| format!("s{}", d))
                        .collect();
                    let mut s = step(&format!("s{}", i), &[]);
                    s.depends_on = deps;
                    s
                })
                .collect();
            // Shuffle declaration order.
            for i in (1..steps.len()).rev() {
                let j = next() % (i + 1);
                steps.swap(i, j);
            }

            let order = topological_order(&steps).unwrap();
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            for s in &steps {
                for dep in &s.depends_on {
                    assert!(position[dep.as_str()] < position[s.id.as_str()]);
                }
            }

            let waves = preview_waves(&steps, None).unwrap();
            let wave_of: HashMap<&str, usize> = waves
                .iter()
                .enumerate()
                .flat_map(|(w, ids)| ids.iter().map(move |id| (id.as_str(), w)))
                .collect();
            assert_eq!(wave_of.len(), steps.len());
            for s in &steps {
                for dep in &s.depends_on {
                    assert!(wave_of[dep.as_str()] < wave_of[s.id.as_str()]);
                }
            }
        }
    }
}
