use crate::graph::{DependencyGraph, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashSet, VecDeque};

/// Result of layering the active part of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layering {
    /// Every node in level `k` depends only on nodes in levels `< k`.
    /// Nodes within a level are in insertion order.
    pub levels: Vec<Vec<NodeId>>,
    /// Active nodes that can never be scheduled: cycle members and everything
    /// downstream of one. Sorted.
    pub blocked: Vec<NodeId>,
}

impl Layering {
    /// Level-major evaluation order.
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.levels.iter().flatten().copied()
    }
}

/// Kahn's Algorithm, emitting one frontier at a time.
///
/// Only nodes with `active[i] == true` take part; `active` must be closed
/// under parents (true for the whole graph and for any upstream closure).
pub fn layer(graph: &DependencyGraph, active: &[bool]) -> Layering {
    let count = graph.count();
    let mut in_degree = vec![0usize; count];
    let mut frontier = Vec::new();

    // 1. Initialize In-Degrees O(N)
    for node in graph.nodes().filter(|n| active[n.index()]) {
        let degree = graph.get_parents(node).len();
        in_degree[node.index()] = degree;
        if degree == 0 {
            frontier.push(node);
        }
    }

    // 2. Peel frontiers
    let mut levels = Vec::new();
    let mut emitted = 0;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &node in &frontier {
            for child in graph.children(node) {
                let c = child.index();
                if !active[c] {
                    continue;
                }
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    next.push(child);
                }
            }
        }
        next.sort_unstable();
        emitted += frontier.len();
        levels.push(std::mem::replace(&mut frontier, next));
    }

    let blocked = if emitted == active.iter().filter(|a| **a).count() {
        Vec::new()
    } else {
        graph.nodes().filter(|n| active[n.index()] && in_degree[n.index()] > 0).collect()
    };

    Layering { levels, blocked }
}

/// Groups of nodes that form dependency cycles (strongly connected components
/// of size > 1, or a node referencing itself). Members and groups are sorted.
pub fn cycles(graph: &DependencyGraph) -> Vec<Vec<NodeId>> {
    let mut pg: DiGraph<(), ()> = DiGraph::with_capacity(graph.count(), graph.edge_count());
    for _ in 0..graph.count() {
        pg.add_node(());
    }
    for node in graph.nodes() {
        for &parent in graph.get_parents(node) {
            pg.add_edge(NodeIndex::new(node.index()), NodeIndex::new(parent.index()), ());
        }
    }

    let mut groups: Vec<Vec<NodeId>> = tarjan_scc(&pg)
        .into_iter()
        .filter(|scc| scc.len() > 1 || pg.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut members: Vec<NodeId> = scc.into_iter().map(|i| NodeId::new(i.index())).collect();
            members.sort_unstable();
            members
        })
        .collect();
    groups.sort_unstable();
    groups
}

/// Identifies all nodes that transitively depend on the given start nodes
/// (start nodes included).
pub fn downstream_from(graph: &DependencyGraph, start_nodes: &[NodeId]) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start_nodes.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            queue.extend(graph.children(node));
        }
    }
    visited
}

/// The dependency closure of the given nodes (start nodes included).
pub fn upstream_from(graph: &DependencyGraph, start_nodes: &[NodeId]) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start_nodes.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            queue.extend(graph.get_parents(node).iter().copied());
        }
    }
    visited
}
