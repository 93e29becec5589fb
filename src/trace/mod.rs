//! Trace input: raw rows, normalization and source-line lookup

pub mod loader;
pub mod normalizer;
pub mod record;
pub mod sourcelines;

pub use normalizer::{NormalizedTrace, TraceNormalizer};
pub use record::AccessRecord;
pub use sourcelines::SourceLineTable;
