//! Alignment-tolerant distance between n-grams
//!
//! Block ids are per-trace labels, so two n-grams are compared only after
//! the block ids of one are relabelled onto the other's. The relabelling
//! pairs unique ids by first-seen order, rotated through every possible
//! starting partner. For each relabelling the shorter sequence is also
//! slid right by up to the length difference.
//!
//! This is a bounded local search, not an edit distance: it evaluates
//! `unique_blocks × (length_difference + 1)` linear-time alignments and
//! keeps the cheapest. It is not guaranteed to find the optimal alignment.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cost of comparing an element against nothing, or a read against a write
const MISMATCH_COST: u64 = 2;

/// One aligned element: block, offset (stride) and access type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessTriple {
    pub block: i64,
    pub offset: i64,
    pub is_read: bool,
}

impl AccessTriple {
    pub fn new(block: i64, offset: i64, is_read: bool) -> Self {
        Self { block, offset, is_read }
    }
}

/// Normalized dissimilarity in `[0, 1]`; 0 means identical.
///
/// Symmetric: the sequence with more unique blocks (then the longer one,
/// then the lexicographically greater one) always keeps its labels.
pub fn distance(a: &[AccessTriple], b: &[AccessTriple]) -> f64 {
    if a == b {
        return 0.0;
    }

    let (primary, secondary) = match rank(a).cmp(&rank(b)) {
        Ordering::Less => (b, a),
        _ => (a, b),
    };

    let targets = unique_blocks(primary);
    let sources = unique_blocks(secondary);
    let source_slot: HashMap<i64, usize> = sources.iter().enumerate().map(|(i, &block)| (block, i)).collect();

    let shifts = a.len().abs_diff(b.len());
    let rotations = targets.len().max(1);
    let mut best = f64::INFINITY;

    for rotation in 0..rotations {
        let remapped: Vec<AccessTriple> = if targets.is_empty() {
            secondary.to_vec()
        } else {
            secondary
                .iter()
                .map(|t| AccessTriple {
                    block: targets[(source_slot[&t.block] + rotation) % targets.len()],
                    ..*t
                })
                .collect()
        };

        let (longer, shorter) = if primary.len() >= remapped.len() {
            (primary, remapped.as_slice())
        } else {
            (remapped.as_slice(), primary)
        };

        for shift in 0..=shifts {
            best = best.min(shifted_cost(longer, shorter, shift));
        }
    }

    best
}

/// Ordering key deciding which side keeps its labels
fn rank(seq: &[AccessTriple]) -> (usize, usize, &[AccessTriple]) {
    (unique_blocks(seq).len(), seq.len(), seq)
}

/// Unique block ids in order of first appearance
fn unique_blocks(seq: &[AccessTriple]) -> Vec<i64> {
    let mut seen = Vec::new();
    for t in seq {
        if !seen.contains(&t.block) {
            seen.push(t.block);
        }
    }
    seen
}

/// Normalized cost with `shift` absent markers in front of `shorter`
fn shifted_cost(longer: &[AccessTriple], shorter: &[AccessTriple], shift: usize) -> f64 {
    let positions = longer.len().max(shorter.len() + shift);
    if positions == 0 {
        return 0.0;
    }

    let cost: u64 = (0..positions)
        .map(|i| {
            let x = longer.get(i);
            let y = i.checked_sub(shift).and_then(|j| shorter.get(j));
            element_cost(x, y)
        })
        .sum();

    cost as f64 / (2 * positions) as f64
}

fn element_cost(x: Option<&AccessTriple>, y: Option<&AccessTriple>) -> u64 {
    match (x, y) {
        (Some(x), Some(y)) if x.is_read != y.is_read => MISMATCH_COST,
        (Some(x), Some(y)) => u64::from(x.block != y.block) + u64::from(x.offset != y.offset),
        (None, None) => 0,
        _ => MISMATCH_COST,
    }
}
