//! Frequency reduction of the pattern tree
//!
//! Keeps only the nodes and edge contexts that occur in more than a given
//! fraction of all records. Failing nodes are dropped outright, so the
//! reduced graph may be disconnected.

use std::collections::HashSet;

use super::tree::{Anchor, EdgeId, NodeId, PatternTree};
use crate::core::error::{MinerError, MinerResult};

/// Significant subgraph of a [`PatternTree`] for one threshold
#[derive(Debug, Clone)]
pub struct ReducedTree {
    threshold: f64,
    total_records: u64,
    nodes: HashSet<NodeId>,
    edges: HashSet<(NodeId, Anchor, Anchor)>,
    /// Kept edges in tree order
    edge_ids: Vec<EdgeId>,
}

impl ReducedTree {
    /// Project `tree` onto the nodes and edges whose counts exceed
    /// `threshold * total_records`.
    pub fn derive(tree: &PatternTree, threshold: f64) -> MinerResult<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(MinerError::InvalidArgument(format!(
                "reduction threshold must be a finite value >= 0, got {}",
                threshold
            )));
        }

        let limit = threshold * tree.total_records() as f64;
        let passes = |count: u64| count as f64 > limit;

        let nodes: HashSet<NodeId> = tree
            .nodes()
            .filter(|(_, node)| passes(node.visit_count))
            .map(|(id, _)| id)
            .collect();

        let mut edges = HashSet::new();
        let mut edge_ids = Vec::new();
        for (edge_id, edge) in tree.edges() {
            if nodes.contains(&edge.child)
                && passes(tree.anchor_count(edge.parent))
                && passes(edge.count)
            {
                edges.insert((edge.child, edge.parent, edge.grandparent));
                edge_ids.push(edge_id);
            }
        }

        tracing::debug!(
            "Reduced tree at threshold {}: {}/{} nodes, {}/{} edges",
            threshold,
            nodes.len(),
            tree.node_count(),
            edges.len(),
            tree.edge_count()
        );

        Ok(Self {
            threshold,
            total_records: tree.total_records(),
            nodes,
            edges,
            edge_ids,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record count of the tree this was derived from
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn contains_edge(&self, child: NodeId, parent: Anchor, grandparent: Anchor) -> bool {
        self.edges.contains(&(child, parent, grandparent))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Kept node ids in ascending order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Kept edge ids in tree order
    pub fn edge_ids(&self) -> &[EdgeId] {
        &self.edge_ids
    }
}
