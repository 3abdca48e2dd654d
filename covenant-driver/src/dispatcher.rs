// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Order harnesses so that a contract is only replaced after it was checked.
//!
//! Every distinct check target is a node, and a check harness of `T` that
//! replaces `U` adds the edge `T -> U`. Strongly connected components are
//! groups of mutually recursive contracts: they are checked in the same stage,
//! each assuming the others. Stages run one after the other; everything within
//! a stage is independent.

use covenant_metadata::{HarnessMetadata, VerificationStatus, targets_overlap};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("harness `{0}` is registered more than once")]
    DuplicateHarness(String),
    #[error("`{harness}` replaces `{target}`, but no harness checks the contract of `{target}`")]
    Unchecked { harness: String, target: String },
    #[error("`{harness}` replaces `{target}`, whose check harness `{check}` did not pass")]
    FailedDependency { harness: String, target: String, check: String },
    #[error(
        "`{harness}` assumes the contract of `{target}` in the same recursion group, whose check harness `{check}` did not pass"
    )]
    FailedGroupMember { harness: String, target: String, check: String },
}

/// Check targets that may designate the same function, as written by harnesses.
#[derive(Debug, Default)]
struct Target {
    spellings: Vec<String>,
    /// Harnesses checking this target, by index.
    checks: Vec<usize>,
}

impl Target {
    fn designates(&self, written: &str) -> bool {
        self.spellings.iter().any(|spelling| targets_overlap(spelling, written))
    }

    fn name(&self) -> &str {
        self.spellings.first().map(String::as_str).unwrap_or_default()
    }
}

/// The order harnesses run in.
#[derive(Debug)]
pub struct Plan {
    stages: Vec<Vec<usize>>,
    eager: BTreeMap<usize, DispatchError>,
    targets: Vec<Target>,
    /// The recursion group of each target.
    group_of: Vec<usize>,
    /// Targets each harness replaces, resolved.
    stubbed: Vec<Vec<usize>>,
    /// The target each harness checks, resolved.
    checked: Vec<Option<usize>>,
    names: Vec<String>,
    bypassed: bool,
}

impl Plan {
    /// Order `harnesses` by their dependencies.
    pub fn build(harnesses: &[HarnessMetadata]) -> Result<Plan, DispatchError> {
        Self::new(harnesses, false)
    }

    /// Run every harness in a single stage, without dependency checks.
    pub fn unordered(harnesses: &[HarnessMetadata]) -> Result<Plan, DispatchError> {
        Self::new(harnesses, true)
    }

    fn new(harnesses: &[HarnessMetadata], bypassed: bool) -> Result<Plan, DispatchError> {
        let mut seen = BTreeSet::new();
        for harness in harnesses {
            if !seen.insert(harness.pretty_name.as_str()) {
                return Err(DispatchError::DuplicateHarness(harness.pretty_name.clone()));
            }
        }
        let names: Vec<String> = harnesses.iter().map(|h| h.pretty_name.clone()).collect();

        let mut targets: Vec<Target> = Vec::new();
        let mut checked = Vec::with_capacity(harnesses.len());
        for (index, harness) in harnesses.iter().enumerate() {
            let Some(written) = harness.check_target() else {
                checked.push(None);
                continue;
            };
            let node = match targets.iter().position(|target| target.designates(written)) {
                Some(node) => node,
                None => {
                    targets.push(Target::default());
                    targets.len() - 1
                }
            };
            let target = &mut targets[node];
            if !target.spellings.iter().any(|s| s == written) {
                target.spellings.push(written.to_string());
            }
            target.checks.push(index);
            checked.push(Some(node));
        }

        let mut eager = BTreeMap::new();
        let mut stubbed = Vec::with_capacity(harnesses.len());
        for (index, harness) in harnesses.iter().enumerate() {
            let mut resolved = Vec::new();
            for written in harness.verified_stubs() {
                match targets.iter().position(|target| target.designates(written)) {
                    Some(node) => resolved.push(node),
                    None if bypassed => {}
                    None => {
                        eager.entry(index).or_insert_with(|| DispatchError::Unchecked {
                            harness: harness.pretty_name.clone(),
                            target: written.clone(),
                        });
                    }
                }
            }
            stubbed.push(resolved);
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..targets.len()).map(|node| graph.add_node(node)).collect();
        for (index, check) in checked.iter().enumerate() {
            let Some(from) = check else { continue };
            for to in &stubbed[index] {
                if from != to {
                    graph.update_edge(nodes[*from], nodes[*to], ());
                }
            }
        }

        // Components come out in reverse topological order: dependencies first.
        let components = tarjan_scc(&graph);
        let mut group_of = vec![0; targets.len()];
        for (group, component) in components.iter().enumerate() {
            for node in component {
                group_of[graph[*node]] = group;
            }
        }
        let mut levels: Vec<usize> = Vec::with_capacity(components.len());
        for (group, component) in components.iter().enumerate() {
            let level = component
                .iter()
                .flat_map(|node| graph.neighbors(*node))
                .map(|dep| group_of[graph[dep]])
                .filter(|dep| *dep != group)
                .map(|dep| levels.get(dep).map_or(0, |level| level + 1))
                .max()
                .unwrap_or(0);
            levels.push(level);
        }

        let mut stages: Vec<Vec<usize>> = Vec::new();
        for index in 0..harnesses.len() {
            if eager.contains_key(&index) {
                continue;
            }
            let stage = if bypassed {
                0
            } else if let Some(node) = checked[index] {
                levels[group_of[node]]
            } else {
                stubbed[index].iter().map(|node| levels[group_of[*node]] + 1).max().unwrap_or(0)
            };
            if stages.len() <= stage {
                stages.resize_with(stage + 1, Vec::new);
            }
            stages[stage].push(index);
        }
        // Consumers may leave a level without harnesses.
        stages.retain(|stage| !stage.is_empty());
        debug!(
            targets = targets.len(),
            groups = components.len(),
            stages = stages.len(),
            eager_errors = eager.len(),
            "planned verification"
        );
        Ok(Plan { stages, eager, targets, group_of, stubbed, checked, names, bypassed })
    }

    /// Harness indices per stage, in execution order.
    pub fn stages(&self) -> &[Vec<usize>] {
        &self.stages
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Errors known before anything runs.
    pub fn eager_errors(&self) -> impl Iterator<Item = (usize, &DispatchError)> {
        self.eager.iter().map(|(index, error)| (*index, error))
    }

    fn group_checks(&self, group: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.targets
            .iter()
            .enumerate()
            .filter(move |(node, _)| self.group_of[*node] == group)
            .flat_map(|(node, target)| target.checks.iter().map(move |check| (node, *check)))
    }

    /// Why `harness` may not run, given the statuses of the harnesses run so far.
    pub fn blocked(&self, harness: usize, statuses: &[Option<VerificationStatus>]) -> Option<DispatchError> {
        if self.bypassed {
            return None;
        }
        let own_group = self.checked[harness].map(|node| self.group_of[node]);
        for node in &self.stubbed[harness] {
            let group = self.group_of[*node];
            if Some(group) == own_group {
                continue;
            }
            for (member, check) in self.group_checks(group) {
                if statuses[check] != Some(VerificationStatus::Success) {
                    return Some(DispatchError::FailedDependency {
                        harness: self.names[harness].clone(),
                        target: self.targets[member].name().to_string(),
                        check: self.names[check].clone(),
                    });
                }
            }
        }
        None
    }

    /// Passing check harnesses that assumed a member of their own recursion
    /// group whose check did not pass.
    pub fn unsound_group_checks(&self, statuses: &[Option<VerificationStatus>]) -> Vec<(usize, DispatchError)> {
        if self.bypassed {
            return Vec::new();
        }
        let mut statuses = statuses.to_vec();
        let mut downgraded = Vec::new();
        loop {
            let mut changed = false;
            for (harness, checked) in self.checked.iter().enumerate() {
                let Some(node) = checked else { continue };
                if statuses[harness] != Some(VerificationStatus::Success) {
                    continue;
                }
                let group = self.group_of[*node];
                let failed = self.stubbed[harness]
                    .iter()
                    .filter(|stub| self.group_of[**stub] == group)
                    .flat_map(|stub| self.targets[*stub].checks.iter().map(move |check| (*stub, *check)))
                    .find(|(_, check)| {
                        matches!(
                            statuses[*check],
                            Some(VerificationStatus::Failure | VerificationStatus::DependencyError)
                        )
                    });
                if let Some((stub, check)) = failed {
                    statuses[harness] = Some(VerificationStatus::DependencyError);
                    downgraded.push((
                        harness,
                        DispatchError::FailedGroupMember {
                            harness: self.names[harness].clone(),
                            target: self.targets[stub].name().to_string(),
                            check: self.names[check].clone(),
                        },
                    ));
                    changed = true;
                }
            }
            if !changed {
                return downgraded;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_metadata::{HarnessAttributes, HarnessKind};

    fn harness(name: &str, check: Option<&str>, stubs: &[&str]) -> HarnessMetadata {
        let kind = match check {
            Some(target) => HarnessKind::ProofForContract { target_fn: target.to_string() },
            None => HarnessKind::Proof,
        };
        HarnessMetadata {
            pretty_name: format!("demo::{name}"),
            original_file: "demo.rs".to_string(),
            original_line: 1,
            attributes: HarnessAttributes {
                kind,
                verified_stubs: stubs.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn consumers_run_after_checks() {
        let harnesses = vec![
            harness("use_pop", None, &["Stack::pop"]),
            harness("check_pop", Some("Stack::pop"), &["Stack::len"]),
            harness("check_len", Some("crate::Stack::len"), &[]),
            harness("plain", None, &[]),
        ];
        let plan = Plan::build(&harnesses).unwrap();
        assert_eq!(plan.stages(), &[vec![2, 3], vec![1], vec![0]]);
        assert_eq!(plan.eager_errors().count(), 0);
    }

    #[test]
    fn mutual_recursion_shares_a_stage() {
        let harnesses = vec![
            harness("check_even", Some("is_even"), &["is_odd"]),
            harness("check_odd", Some("is_odd"), &["is_even"]),
            harness("use_even", None, &["is_even"]),
        ];
        let plan = Plan::build(&harnesses).unwrap();
        assert_eq!(plan.stages(), &[vec![0, 1], vec![2]]);
    }

    #[test]
    fn unchecked_stubs_are_eager_errors() {
        let harnesses = vec![harness("use_f", None, &["f"]), harness("plain", None, &[])];
        let plan = Plan::build(&harnesses).unwrap();
        let errors: Vec<_> = plan.eager_errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 0);
        assert!(errors[0].1.to_string().contains("no harness checks the contract of `f`"));
        assert_eq!(plan.stages(), &[vec![1]]);
    }

    #[test]
    fn failed_checks_block_consumers() {
        let harnesses = vec![harness("check_f", Some("f"), &[]), harness("use_f", None, &["f"])];
        let plan = Plan::build(&harnesses).unwrap();
        let failed = [Some(VerificationStatus::Failure), None];
        match plan.blocked(1, &failed) {
            Some(DispatchError::FailedDependency { check, .. }) => assert_eq!(check, "demo::check_f"),
            other => panic!("unexpected {other:?}"),
        }
        let passed = [Some(VerificationStatus::Success), None];
        assert_eq!(plan.blocked(1, &passed), None);
    }

    #[test]
    fn failures_spread_within_a_group() {
        let harnesses = vec![
            harness("check_even", Some("is_even"), &["is_odd"]),
            harness("check_odd", Some("is_odd"), &["is_even"]),
        ];
        let plan = Plan::build(&harnesses).unwrap();
        let statuses = [Some(VerificationStatus::Success), Some(VerificationStatus::Failure)];
        let downgraded = plan.unsound_group_checks(&statuses);
        assert_eq!(downgraded.len(), 1);
        assert_eq!(downgraded[0].0, 0);
    }

    #[test]
    fn bypass_ignores_dependencies() {
        let harnesses = vec![harness("use_f", None, &["f"]), harness("check_g", Some("g"), &["h"])];
        let plan = Plan::unordered(&harnesses).unwrap();
        assert!(plan.is_bypassed());
        assert_eq!(plan.eager_errors().count(), 0);
        assert_eq!(plan.stages(), &[vec![0, 1]]);
    }

    #[test]
    fn duplicate_harnesses_are_rejected() {
        let harnesses = vec![harness("h", None, &[]), harness("h", None, &[])];
        assert!(matches!(Plan::build(&harnesses), Err(DispatchError::DuplicateHarness(_))));
    }
}
