//! Pattern tree with two-level access context
//!
//! Every distinct access signature becomes one node. Every time a node is
//! reached, the (node, parent, grandparent) context it was reached through is
//! counted, so a later pass can recognise a return to the exact same
//! two-step path instead of just the same block.
//!
//! Nodes and edge contexts live in arenas addressed by small indices. Edge
//! contexts are found through a flat `(child, parent, grandparent)` index.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::{MinerError, MinerResult};
use crate::trace::AccessRecord;

/// Index of a node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an edge context in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position a node can be reached from: a real node or one of the two
/// sentinels that precede the first access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchor {
    RootParent,
    Root,
    Node(NodeId),
}

impl Anchor {
    pub fn node(self) -> Option<NodeId> {
        match self {
            Anchor::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_sentinel(self) -> bool {
        !matches!(self, Anchor::Node(_))
    }
}

/// Access signature identifying a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub block_id: i64,
    pub stride: i64,
    pub object_size: i64,
    pub source_line: Option<String>,
}

impl NodeKey {
    pub fn new(block_id: i64, stride: i64, object_size: i64) -> Self {
        Self { block_id, stride, object_size, source_line: None }
    }

    pub fn from_record(record: &AccessRecord, include_source_line: bool) -> Self {
        Self {
            block_id: record.block_id,
            stride: record.stride,
            object_size: record.object_size,
            source_line: if include_source_line { record.source_line.clone() } else { None },
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.block_id, self.stride, self.object_size)?;
        if let Some(line) = &self.source_line {
            write!(f, "_{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub key: NodeKey,
    pub visit_count: u64,
    /// Access type of the first access that created the node
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeContext {
    pub child: NodeId,
    pub parent: Anchor,
    pub grandparent: Anchor,
    pub count: u64,
}

/// Frequency-weighted access tree built online from the canonical stream
#[derive(Debug, Clone)]
pub struct PatternTree {
    nodes: Vec<TreeNode>,
    node_index: HashMap<NodeKey, NodeId>,
    edges: Vec<EdgeContext>,
    edge_index: HashMap<(NodeId, Anchor, Anchor), EdgeId>,
    /// Edge contexts leading into each node
    incoming: Vec<Vec<EdgeId>>,
    parent: Anchor,
    grandparent: Anchor,
    total_records: u64,
    include_source_line: bool,
    conflicting_accesses: u64,
}

impl PatternTree {
    pub fn new(include_source_line: bool) -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            incoming: Vec::new(),
            parent: Anchor::Root,
            grandparent: Anchor::RootParent,
            total_records: 0,
            include_source_line,
            conflicting_accesses: 0,
        }
    }

    /// Build a tree from a complete stream
    pub fn from_records(records: &[AccessRecord], include_source_line: bool) -> MinerResult<Self> {
        let mut tree = Self::new(include_source_line);
        tree.ingest(records)?;
        Ok(tree)
    }

    /// Feed records in stream order. Can be called repeatedly; the running
    /// parent/grandparent context carries over between calls.
    pub fn ingest<'a, I>(&mut self, records: I) -> MinerResult<()>
    where
        I: IntoIterator<Item = &'a AccessRecord>,
    {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    /// Feed a single record. Fails only once the node or edge arena
    /// outgrows `u32` indices; the tree should be discarded after that.
    pub fn push(&mut self, record: &AccessRecord) -> MinerResult<NodeId> {
        let key = self.key_for(record);

        let id = match self.node_index.get(&key) {
            Some(&id) => {
                let node = &mut self.nodes[id.index()];
                node.visit_count += 1;
                if node.is_read != record.is_read {
                    self.conflicting_accesses += 1;
                }
                id
            }
            None => {
                let id = NodeId(arena_index(self.nodes.len(), "nodes")?);
                self.nodes.push(TreeNode { key: key.clone(), visit_count: 1, is_read: record.is_read });
                self.incoming.push(Vec::new());
                self.node_index.insert(key, id);
                id
            }
        };

        let context = (id, self.parent, self.grandparent);
        let edge = match self.edge_index.get(&context) {
            Some(&edge) => edge,
            None => {
                let edge = EdgeId(arena_index(self.edges.len(), "edge contexts")?);
                self.edges.push(EdgeContext {
                    child: id,
                    parent: self.parent,
                    grandparent: self.grandparent,
                    count: 0,
                });
                self.edge_index.insert(context, edge);
                self.incoming[id.index()].push(edge);
                edge
            }
        };
        self.edges[edge.index()].count += 1;

        self.grandparent = self.parent;
        self.parent = Anchor::Node(id);
        self.total_records += 1;

        Ok(id)
    }

    /// Key a record maps to under this tree's keying rule
    pub fn key_for(&self, record: &AccessRecord) -> NodeKey {
        NodeKey::from_record(record, self.include_source_line)
    }

    pub fn lookup(&self, key: &NodeKey) -> Option<NodeId> {
        self.node_index.get(key).copied()
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    // Arena lengths never exceed u32 range: `push` refuses to grow past it
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeContext)> {
        self.edges.iter().enumerate().map(|(i, edge)| (EdgeId(i as u32), edge))
    }

    pub fn edge(&self, child: NodeId, parent: Anchor, grandparent: Anchor) -> Option<&EdgeContext> {
        self.edge_index
            .get(&(child, parent, grandparent))
            .map(|edge| &self.edges[edge.index()])
    }

    /// Edge contexts leading into a node
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &EdgeContext> {
        self.incoming[id.index()].iter().map(move |edge| &self.edges[edge.index()])
    }

    /// Visit count used when an anchor is tested as a parent.
    /// Sentinels count as visited once.
    pub fn anchor_count(&self, anchor: Anchor) -> u64 {
        match anchor {
            Anchor::Node(id) => self.nodes[id.index()].visit_count,
            Anchor::Root | Anchor::RootParent => 1,
        }
    }

    pub fn include_source_line(&self) -> bool {
        self.include_source_line
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes visited more than `fraction` of all records, most visited first
    pub fn hot_nodes(&self, fraction: f64) -> Vec<(NodeId, u64)> {
        let limit = fraction * self.total_records as f64;
        let mut hot: Vec<(NodeId, u64)> = self
            .nodes()
            .filter(|(_, node)| node.visit_count as f64 > limit)
            .map(|(id, node)| (id, node.visit_count))
            .collect();
        hot.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hot
    }

    /// Statistics
    pub fn stats(&self) -> TreeStats {
        let read_nodes = self.nodes.iter().filter(|n| n.is_read).count();
        TreeStats {
            total_records: self.total_records,
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            read_nodes,
            write_nodes: self.nodes.len() - read_nodes,
            max_visit_count: self.nodes.iter().map(|n| n.visit_count).max().unwrap_or(0),
            conflicting_accesses: self.conflicting_accesses,
        }
    }
}

/// Index the next arena slot will get
fn arena_index(len: usize, what: &'static str) -> MinerResult<u32> {
    u32::try_from(len).map_err(|_| MinerError::CapacityExceeded {
        what,
        limit: u64::from(u32::MAX) + 1,
    })
}

impl Default for PatternTree {
    fn default() -> Self {
        Self::new(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_records: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub read_nodes: usize,
    pub write_nodes: usize,
    pub max_visit_count: u64,
    /// Accesses whose type disagreed with the type pinned on their node
    pub conflicting_accesses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(block_id: i64, stride: i64, is_read: bool) -> AccessRecord {
        AccessRecord {
            instruction_pointer: 0,
            block_id,
            stride,
            object_size: 8,
            is_read,
            source_line: None,
        }
    }

    #[test]
    fn test_visit_counts_sum_to_records() {
        let records: Vec<AccessRecord> =
            [1, 2, 3, 1, 2, 4, 1, 2, 3].iter().map(|&b| record(b, 0, true)).collect();
        let tree = PatternTree::from_records(&records, false).unwrap();

        let total: u64 = tree.nodes().map(|(_, n)| n.visit_count).sum();
        assert_eq!(total, records.len() as u64);
        assert_eq!(tree.total_records(), 9);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_every_node_has_incoming_edge() {
        let records: Vec<AccessRecord> =
            [5, 5, 6, 7, 5, 6, 6, 7].iter().map(|&b| record(b, 4, b % 2 == 0)).collect();
        let tree = PatternTree::from_records(&records, false).unwrap();

        for (id, _) in tree.nodes() {
            assert!(tree.incoming(id).count() >= 1);
        }
        let edge_total: u64 = tree.edges().map(|(_, e)| e.count).sum();
        assert_eq!(edge_total, records.len() as u64);
    }

    #[test]
    fn test_two_level_context() {
        let records: Vec<AccessRecord> = [1, 2, 3, 1, 2, 3].iter().map(|&b| record(b, 0, true)).collect();
        let tree = PatternTree::from_records(&records, false).unwrap();

        let n1 = tree.lookup(&NodeKey::new(1, 0, 8)).unwrap();
        let n2 = tree.lookup(&NodeKey::new(2, 0, 8)).unwrap();
        let n3 = tree.lookup(&NodeKey::new(3, 0, 8)).unwrap();

        assert_eq!(tree.edge(n1, Anchor::Root, Anchor::RootParent).unwrap().count, 1);
        assert_eq!(tree.edge(n2, Anchor::Node(n1), Anchor::Root).unwrap().count, 1);
        assert_eq!(tree.edge(n2, Anchor::Node(n1), Anchor::Node(n3)).unwrap().count, 1);
        assert_eq!(tree.edge(n3, Anchor::Node(n2), Anchor::Node(n1)).unwrap().count, 2);
        assert_eq!(tree.incoming(n1).count(), 2);
    }

    #[test]
    fn test_first_access_type_is_pinned() {
        let records = vec![record(1, 0, true), record(1, 0, false), record(1, 0, false)];
        let tree = PatternTree::from_records(&records, false).unwrap();
        let id = tree.lookup(&NodeKey::new(1, 0, 8)).unwrap();
        assert!(tree.node(id).is_read);
        assert_eq!(tree.stats().conflicting_accesses, 2);
    }

    #[test]
    fn test_source_line_keying() {
        let records = vec![
            record(1, 0, true).with_source_line("a.c-1"),
            record(1, 0, true).with_source_line("a.c-2"),
        ];
        assert_eq!(PatternTree::from_records(&records, false).unwrap().node_count(), 1);
        assert_eq!(PatternTree::from_records(&records, true).unwrap().node_count(), 2);
    }

    #[test]
    fn test_ingest_continues_context() {
        let records: Vec<AccessRecord> = [1, 2, 3].iter().map(|&b| record(b, 0, true)).collect();
        let mut tree = PatternTree::new(false);
        tree.ingest(&records[..2]).unwrap();
        tree.ingest(&records[2..]).unwrap();

        let n1 = tree.lookup(&NodeKey::new(1, 0, 8)).unwrap();
        let n2 = tree.lookup(&NodeKey::new(2, 0, 8)).unwrap();
        let n3 = tree.lookup(&NodeKey::new(3, 0, 8)).unwrap();
        assert!(tree.edge(n3, Anchor::Node(n2), Anchor::Node(n1)).is_some());
    }

    #[test]
    fn test_hot_nodes_ordering() {
        let records: Vec<AccessRecord> = [1, 1, 1, 2, 2, 3].iter().map(|&b| record(b, 0, true)).collect();
        let tree = PatternTree::from_records(&records, false).unwrap();
        let hot = tree.hot_nodes(0.2);
        let counts: Vec<u64> = hot.iter().map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![3, 2]);
    }

    #[test]
    fn test_arena_index_bounds() {
        assert_eq!(arena_index(0, "nodes"), Ok(0));
        assert_eq!(arena_index(u32::MAX as usize, "nodes"), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_arena_index_overflow_is_an_error() {
        let err = arena_index(u32::MAX as usize + 1, "edge contexts").unwrap_err();
        assert_eq!(
            err,
            MinerError::CapacityExceeded { what: "edge contexts", limit: 1 << 32 }
        );
        assert!(err.to_string().contains("edge contexts"));
    }
}
