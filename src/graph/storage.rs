//! storage.rs
//! Dense Columnar Layout for the derived dependency graph.
//!
//! Node `i` is the `i`-th metric of the denormalized graph. Parents are the
//! metrics a node references; children are the metrics that reference it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

const NO_EDGE: u32 = u32::MAX;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    // Dense Topology (CSR parents)
    parents_flat: Vec<NodeId>,
    parents_ranges: Vec<(u32, u32)>,

    // Adjacency List (Children)
    first_child: Vec<u32>,
    child_targets: Vec<NodeId>,
    next_child: Vec<u32>,
}

impl DependencyGraph {
    /// Builds the graph from one parent list per node. Parents may point at
    /// nodes that appear later in the list.
    pub fn from_parents<P: AsRef<[NodeId]>>(parent_lists: &[P]) -> Self {
        let count = parent_lists.len();
        let mut g = Self {
            parents_flat: Vec::new(),
            parents_ranges: Vec::with_capacity(count),
            first_child: vec![NO_EDGE; count],
            child_targets: Vec::new(),
            next_child: Vec::new(),
        };

        for (i, parents) in parent_lists.iter().enumerate() {
            let parents = parents.as_ref();
            let id = NodeId::new(i);

            // 1. Parents (CSR append)
            let start = g.parents_flat.len() as u32;
            g.parents_flat.extend_from_slice(parents);
            g.parents_ranges.push((start, parents.len() as u32));

            // 2. Children (linked list prepend on each parent)
            for &parent in parents {
                let p_idx = parent.index();
                let head = g.first_child[p_idx];
                let new_edge = g.child_targets.len() as u32;
                g.child_targets.push(id);
                g.next_child.push(head);
                g.first_child[p_idx] = new_edge;
            }
        }
        g
    }

    pub fn count(&self) -> usize { self.parents_ranges.len() }

    pub fn edge_count(&self) -> usize { self.parents_flat.len() }

    #[inline(always)]
    pub fn get_parents(&self, id: NodeId) -> &[NodeId] {
        let (start, count) = self.parents_ranges[id.index()];
        &self.parents_flat[start as usize..(start + count) as usize]
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children { graph: self, edge: self.first_child[id.index()] }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.count()).map(NodeId::new)
    }
}

/// Walks a node's child linked list.
pub struct Children<'a> {
    graph: &'a DependencyGraph,
    edge: u32,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.edge == NO_EDGE {
            return None;
        }
        let idx = self.edge as usize;
        self.edge = self.graph.next_child[idx];
        Some(self.graph.child_targets[idx])
    }
}
