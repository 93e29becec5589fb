//! Benchmark suite for the mining stages
//!
//! Times normalization, tree construction, reduction, extraction and
//! similarity scoring on seeded synthetic traces.

pub mod runner;
pub mod synthetic;

pub use runner::{BenchmarkResult, BenchmarkRunner};
pub use synthetic::SyntheticTrace;
