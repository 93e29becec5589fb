//! N-gram extraction
//!
//! Replays the canonical stream against a reduced tree and cuts it into
//! repeating units. A candidate sequence grows while every access arrives
//! through a significant (node, parent, grandparent) context; it closes as
//! soon as the walk comes back to the two-step context it started with.
//! Structurally identical units are counted together.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::distance::AccessTriple;
use super::reducer::ReducedTree;
use super::tree::{Anchor, NodeId, NodeKey, PatternTree};
use crate::core::error::{MinerError, MinerResult, Stage};
use crate::trace::AccessRecord;

/// One element of an n-gram
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NGramElement {
    pub key: NodeKey,
    pub is_read: bool,
}

impl NGramElement {
    pub fn triple(&self) -> AccessTriple {
        AccessTriple {
            block: self.key.block_id,
            offset: self.key.stride,
            is_read: self.is_read,
        }
    }
}

/// A detected repeating unit and how often it was seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NGram {
    pub elements: Vec<NGramElement>,
    pub occurrences: u64,
}

impl NGram {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Occurrences relative to the number of records mined
    pub fn ratio(&self, total_records: u64) -> f64 {
        if total_records == 0 {
            return 0.0;
        }
        self.occurrences as f64 / total_records as f64
    }

    /// (block, stride, access type) view used for alignment
    pub fn triples(&self) -> Vec<AccessTriple> {
        self.elements.iter().map(NGramElement::triple).collect()
    }
}

/// Opening pair shared by all variants filed together
type OpeningPair = (NodeKey, NodeKey);

/// All n-gram variants found in one stream, in order of first discovery
#[derive(Debug, Clone, Default)]
pub struct NGramSet {
    variants: Vec<NGram>,
    by_opening: HashMap<OpeningPair, Vec<usize>>,
    total_records: u64,
}

impl NGramSet {
    pub fn new(total_records: u64) -> Self {
        Self { total_records, ..Default::default() }
    }

    /// File a completed unit under its opening pair; count it if an
    /// identical variant exists, add it otherwise.
    fn record(&mut self, opening: OpeningPair, elements: Vec<NGramElement>) {
        let slots = self.by_opening.entry(opening).or_default();

        if let Some(&idx) = slots.iter().find(|&&idx| self.variants[idx].elements == elements) {
            self.variants[idx].occurrences += 1;
            return;
        }

        slots.push(self.variants.len());
        self.variants.push(NGram { elements, occurrences: 1 });
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Every variant, including rare ones
    pub fn variants(&self) -> &[NGram] {
        &self.variants
    }

    /// Number of distinct opening pairs
    pub fn opening_count(&self) -> usize {
        self.by_opening.len()
    }

    /// Variants whose occurrence ratio exceeds `min_ratio`, discovery order
    pub fn emitted(&self, min_ratio: f64) -> Vec<&NGram> {
        self.variants
            .iter()
            .filter(|ngram| ngram.ratio(self.total_records) > min_ratio)
            .collect()
    }
}

/// Replays a stream against a reduced tree to find repeating cycles
#[derive(Debug, Clone)]
pub struct NGramExtractor {
    flush_fraction: f64,
}

impl NGramExtractor {
    /// `flush_fraction`: an unfinished candidate longer than this fraction of
    /// the stream is kept at the end instead of dropped
    pub fn new(flush_fraction: f64) -> Self {
        Self { flush_fraction }
    }

    pub fn extract(
        &self,
        tree: &PatternTree,
        reduced: &ReducedTree,
        records: &[AccessRecord],
    ) -> MinerResult<NGramSet> {
        if tree.is_empty() {
            return Err(MinerError::StateNotReady(Stage::Tree));
        }
        if records.is_empty() {
            return Err(MinerError::EmptyTrace);
        }

        let total = records.len() as u64;
        let mut set = NGramSet::new(total);
        let mut candidate: Vec<(NodeId, bool)> = Vec::new();

        let mut parent = Anchor::Root;
        let mut grandparent = Anchor::RootParent;
        let mut previous_is_read = false;

        for record in records {
            // Keys the tree never saw restart the context
            let Some(id) = tree.lookup(&tree.key_for(record)) else {
                candidate.clear();
                parent = Anchor::Root;
                grandparent = Anchor::RootParent;
                previous_is_read = record.is_read;
                continue;
            };

            let significant = reduced.contains_node(id) && reduced.contains_edge(id, parent, grandparent);

            match parent.node() {
                Some(parent_id) if significant => {
                    if candidate.is_empty() {
                        candidate.push((parent_id, previous_is_read));
                    }
                    candidate.push((id, record.is_read));

                    if candidate.len() > 2 && candidate[1].0 == id && candidate[0].0 == parent_id {
                        let opening = (tree.node(candidate[0].0).key.clone(), tree.node(candidate[1].0).key.clone());
                        let body_len = candidate.len() - 2;
                        let closing = candidate.split_off(body_len);
                        tracing::trace!("Cycle of length {} closed at {}", body_len, tree.node(id).key);
                        set.record(opening, to_elements(tree, &candidate));
                        candidate = closing;
                    }
                }
                _ => candidate.clear(),
            }

            grandparent = parent;
            parent = Anchor::Node(id);
            previous_is_read = record.is_read;
        }

        if candidate.len() >= 2 && candidate.len() as f64 > self.flush_fraction * total as f64 {
            tracing::debug!("Flushing trailing candidate of length {}", candidate.len());
            let opening = (tree.node(candidate[0].0).key.clone(), tree.node(candidate[1].0).key.clone());
            set.record(opening, to_elements(tree, &candidate));
        }

        tracing::debug!(
            "Extracted {} n-gram variants under {} opening pairs",
            set.len(),
            set.opening_count()
        );

        Ok(set)
    }
}

impl Default for NGramExtractor {
    fn default() -> Self {
        Self::new(0.5)
    }
}

fn to_elements(tree: &PatternTree, sequence: &[(NodeId, bool)]) -> Vec<NGramElement> {
    sequence
        .iter()
        .map(|&(id, is_read)| NGramElement { key: tree.node(id).key.clone(), is_read })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(block_id: i64, is_read: bool) -> AccessRecord {
        AccessRecord {
            instruction_pointer: block_id as u64,
            block_id,
            stride: 8,
            object_size: 8,
            is_read,
            source_line: None,
        }
    }

    fn mine(records: &[AccessRecord], threshold: f64) -> NGramSet {
        let tree = PatternTree::from_records(records, false).unwrap();
        let reduced = ReducedTree::derive(&tree, threshold).unwrap();
        NGramExtractor::default().extract(&tree, &reduced, records).unwrap()
    }

    fn blocks(ngram: &NGram) -> Vec<i64> {
        ngram.elements.iter().map(|e| e.key.block_id).collect()
    }

    #[test]
    fn test_clean_cycle_yields_single_ngram() {
        let records: Vec<AccessRecord> = (0..100).map(|i| access([1, 2, 3][i % 3], true)).collect();
        let set = mine(&records, 0.001);

        let emitted = set.emitted(0.01);
        assert_eq!(emitted.len(), 1);
        assert_eq!(blocks(emitted[0]), vec![1, 2, 3]);
        assert_eq!(emitted[0].occurrences, 32);
        assert!((emitted[0].ratio(100) - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_access_type_separates_variants() {
        // Same blocks, block 3 alternates between read and write
        let mut records = Vec::new();
        for i in 0..40 {
            records.push(access(1, true));
            records.push(access(2, true));
            records.push(access(3, i % 2 == 0));
        }
        let set = mine(&records, 0.0);
        let emitted = set.emitted(0.01);

        assert_eq!(emitted.len(), 2);
        assert_eq!(set.opening_count(), 1);
        assert!(emitted.iter().all(|n| blocks(n) == vec![1, 2, 3]));
        assert_ne!(emitted[0].elements[2].is_read, emitted[1].elements[2].is_read);
    }

    #[test]
    fn test_variable_length_cycles_share_opening() {
        // 1 2 3 | 1 2 3 4 | 1 2 3 | 1 2 3 4 ...
        let mut records = Vec::new();
        for i in 0..30 {
            for b in [1, 2, 3] {
                records.push(access(b, true));
            }
            if i % 2 == 1 {
                records.push(access(4, true));
            }
        }
        let set = mine(&records, 0.0);
        let lengths: Vec<usize> = set.variants().iter().map(NGram::len).collect();
        assert!(lengths.contains(&3));
        assert!(lengths.contains(&4));
    }

    #[test]
    fn test_insignificant_context_resets_candidate() {
        let mut records: Vec<AccessRecord> = (0..90).map(|i| access([1, 2, 3][i % 3], true)).collect();
        // A one-off block breaks the stream
        records.insert(45, access(99, false));
        let set = mine(&records, 0.02);
        assert!(set.variants().iter().all(|n| !blocks(n).contains(&99)));
        let emitted = set.emitted(0.01);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), 3);
    }

    #[test]
    fn test_opening_write_keeps_its_access_type() {
        // 1 is always written, 2 and 3 read
        let records: Vec<AccessRecord> =
            (0..90).map(|i| access([1, 2, 3][i % 3], i % 3 != 0)).collect();
        let set = mine(&records, 0.001);

        // The seeded first cycle and the restarted ones are one variant
        assert_eq!(set.len(), 1);
        let emitted = set.emitted(0.01);
        assert_eq!(emitted.len(), 1);
        assert_eq!(blocks(emitted[0]), vec![1, 2, 3]);
        assert!(!emitted[0].elements[0].is_read);
        assert!(emitted[0].elements[1].is_read);
        assert_eq!(emitted[0].occurrences, 29);
    }

    #[test]
    fn test_long_tail_is_flushed() {
        // Never returns to its opening pair
        let records: Vec<AccessRecord> = (0..20).map(|b| access(b, true)).collect();
        let set = mine(&records, 0.0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.variants()[0].len(), 20);
    }

    #[test]
    fn test_deterministic() {
        let records: Vec<AccessRecord> =
            (0..300).map(|i| access([4, 5, 6, 4, 7][i % 5], i % 7 != 0)).collect();
        let a = mine(&records, 0.001);
        let b = mine(&records, 0.001);
        assert_eq!(a.variants(), b.variants());
    }

    #[test]
    fn test_emitted_ratios_exceed_floor() {
        let records: Vec<AccessRecord> =
            (0..500).map(|i| access([1, 2, 1, 3, 2][i % 5], i % 3 == 0)).collect();
        let set = mine(&records, 0.001);
        for ngram in set.emitted(0.01) {
            assert!(ngram.ratio(set.total_records()) > 0.01);
        }
    }

    #[test]
    fn test_empty_tree_not_ready() {
        let tree = PatternTree::default();
        let reduced = ReducedTree::derive(&tree, 0.0).unwrap();
        let err = NGramExtractor::default().extract(&tree, &reduced, &[access(1, true)]).unwrap_err();
        assert_eq!(err, MinerError::StateNotReady(Stage::Tree));
    }
}
