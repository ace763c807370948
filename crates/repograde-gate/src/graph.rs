//! Import cycle detection.
//!
//! Every internal import edge counts, including imports deferred into function bodies, so
//! this over-approximates cycles that would actually fail at import time.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Strongly connected components with two or more members, each sorted, in sorted order.
///
/// Edges to modules that are not keys of `edges` are ignored.
pub fn import_cycles(edges: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let index: BTreeMap<&str, NodeIndex> = edges
        .keys()
        .map(|m| (m.as_str(), graph.add_node(m.as_str())))
        .collect();

    for (from, targets) in edges {
        for to in targets {
            if let Some(&t) = index.get(to.as_str()) {
                graph.add_edge(index[from.as_str()], t, ());
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() >= 2)
        .map(|scc| {
            let mut members: Vec<String> = scc.into_iter().map(|n| graph[n].to_string()).collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();
    cycles
}
