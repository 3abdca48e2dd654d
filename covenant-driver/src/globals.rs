// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Find the mutable statics each contracted function may reach.
//!
//! A replaced call havocs only what its footprint names, so a global written
//! behind a contract must be declared: without any `modifies` clause the
//! function cannot be replaced soundly, and with clauses that omit the global
//! the function writes outside its frame.

use crate::scan::{Call, FnItem, SourceIndex};
use covenant_metadata::{FindingKind, GlobalFinding, target_matches};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Keep the candidates declared next to `caller` when there are any.
fn prefer_local<'a, T>(candidates: Vec<(usize, &'a T)>, local: impl Fn(&T) -> bool) -> Vec<usize> {
    let near: Vec<usize> = candidates.iter().filter(|(_, item)| local(*item)).map(|(at, _)| *at).collect();
    if near.is_empty() { candidates.into_iter().map(|(at, _)| at).collect() } else { near }
}

fn written(caller: &FnItem, segments: &[String]) -> String {
    let resolved: Vec<&str> = segments
        .iter()
        .map(|segment| match (segment.as_str(), &caller.self_ty) {
            ("Self", Some(ty)) => ty.as_str(),
            (segment, _) => segment,
        })
        .collect();
    resolved.join("::")
}

fn callees(index: &SourceIndex, caller: &FnItem, call: &Call) -> Vec<usize> {
    match call {
        Call::Path(segments) => {
            let written = written(caller, segments);
            let candidates: Vec<_> =
                index.functions.iter().enumerate().filter(|(_, f)| target_matches(&f.path, &written)).collect();
            prefer_local(candidates, |f| f.module == caller.module && f.self_ty.is_none())
        }
        Call::Method(name) => index
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.self_ty.is_some() && f.name == *name)
            .map(|(at, _)| at)
            .collect(),
    }
}

fn touched_statics(index: &SourceIndex, function: &FnItem) -> BTreeSet<usize> {
    let mut touched = BTreeSet::new();
    for path in &function.paths {
        let written = written(function, path);
        let candidates: Vec<_> = index
            .statics
            .iter()
            .enumerate()
            .filter(|(_, s)| s.mutable && target_matches(&s.path, &written))
            .collect();
        touched.extend(prefer_local(candidates, |s| s.module == function.module));
    }
    touched
}

/// Report every mutable static a contracted function reaches without declaring it.
pub fn analyze(index: &SourceIndex) -> Vec<GlobalFinding> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..index.functions.len()).map(|at| graph.add_node(at)).collect();
    for (at, function) in index.functions.iter().enumerate() {
        for call in &function.calls {
            for callee in callees(index, function, call) {
                graph.update_edge(nodes[at], nodes[callee], ());
            }
        }
    }
    let touched: Vec<BTreeSet<usize>> = index.functions.iter().map(|f| touched_statics(index, f)).collect();

    let mut findings = Vec::new();
    for (root, function) in index.functions.iter().enumerate() {
        if function.clauses.is_empty() {
            continue;
        }
        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([nodes[root]]);
        let mut visited = BTreeSet::from([nodes[root]]);
        let mut reported = BTreeSet::new();
        while let Some(node) = queue.pop_front() {
            let at = graph[node];
            for global in &touched[at] {
                if !reported.insert(*global) {
                    continue;
                }
                let global = &index.statics[*global];
                let kind = if function.clauses.modifies.is_empty() {
                    FindingKind::UndeclaredGlobal
                } else if !function.clauses.modified_names.contains(&global.name) {
                    FindingKind::FrameViolation
                } else {
                    continue;
                };
                let mut via = vec![index.functions[at].path.clone()];
                let mut cursor = node;
                while let Some(parent) = parents.get(&cursor) {
                    via.push(index.functions[graph[*parent]].path.clone());
                    cursor = *parent;
                }
                via.reverse();
                findings.push(GlobalFinding {
                    function: function.path.clone(),
                    global: global.path.clone(),
                    kind,
                    via,
                    location: Some(function.location.clone()),
                });
            }
            for next in graph.neighbors(node) {
                if visited.insert(next) {
                    parents.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
    }
    debug!(findings = findings.len(), "global reachability");
    findings
}
