//! Pattern mining algorithms
//!
//! - Pattern tree: frequency-weighted access tree with two-level context
//! - Reducer: significant subgraph for a frequency threshold
//! - Extractor: repeating cycles (n-grams) replayed against the reduced tree
//! - Distance: alignment-tolerant n-gram dissimilarity
//! - Similarity: pairwise distance matrix

pub mod distance;
pub mod extractor;
pub mod reducer;
pub mod similarity;
pub mod tree;

pub use distance::{distance, AccessTriple};
pub use extractor::{NGram, NGramElement, NGramExtractor, NGramSet};
pub use reducer::ReducedTree;
pub use similarity::{MatrixDocument, SimilarityMatrix};
pub use tree::{Anchor, EdgeContext, NodeId, NodeKey, PatternTree, TreeNode, TreeStats};
