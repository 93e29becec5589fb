//! memtrace-ngram
//!
//! Mines recurring access patterns (n-grams) out of memory-access traces
//! and scores how alike two patterns are.
//!
//! ## Stages
//!
//! - **Normalizer**: assigns dense block ids and per-block strides to raw traces
//! - **Pattern Tree**: counts every access in its two-access context
//! - **Reducer**: drops nodes and contexts seen too rarely to matter
//! - **Extractor**: walks the trace against the reduced tree and collects
//!   repeating closures
//! - **Distance**: relabelling-invariant alignment distance between n-grams,
//!   and the pairwise similarity matrix built on it

pub mod algorithms;
pub mod bench;
pub mod core;
pub mod report;
pub mod trace;

// Re-exports
pub use algorithms::{
    distance, AccessTriple, NGram, NGramExtractor, NGramSet, PatternTree, ReducedTree,
    SimilarityMatrix,
};
pub use core::config::MinerConfig;
pub use core::error::{MinerError, MinerResult};
pub use core::pipeline::{MiningPass, TraceMiner};
pub use trace::{AccessRecord, SourceLineTable, TraceNormalizer};
