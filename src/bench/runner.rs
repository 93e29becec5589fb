//! Benchmark runner for the mining stages

use std::time::Instant;

use super::synthetic::SyntheticTrace;
use crate::algorithms::{AccessTriple, NGramExtractor, PatternTree, ReducedTree, SimilarityMatrix};
use crate::core::config::MinerConfig;
use crate::trace::{AccessRecord, TraceNormalizer};

pub struct BenchmarkRunner {
    iterations: usize,
    warmup: usize,
    records: usize,
    config: MinerConfig,
}

#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub name: String,
    pub iterations: usize,
    pub total_ms: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub ops_per_sec: f64,
}

impl BenchmarkRunner {
    pub fn new(iterations: usize, records: usize) -> Self {
        Self {
            iterations: iterations.max(1),
            warmup: 2,
            records,
            config: MinerConfig::default(),
        }
    }

    fn measure<F: FnMut()>(&self, name: &str, mut op: F) -> BenchmarkResult {
        // Warmup
        for _ in 0..self.warmup {
            op();
        }

        let mut times = Vec::with_capacity(self.iterations);
        let start = Instant::now();

        for _ in 0..self.iterations {
            let iter_start = Instant::now();
            op();
            times.push(iter_start.elapsed().as_micros() as u64);
        }

        let total = start.elapsed().as_millis() as u64;
        let min = times.iter().min().copied().unwrap_or(0) / 1000;
        let max = times.iter().max().copied().unwrap_or(0) / 1000;
        let avg = total as f64 / self.iterations as f64;
        let ops = if total > 0 {
            self.iterations as f64 / (total as f64 / 1000.0)
        } else {
            f64::INFINITY
        };

        BenchmarkResult {
            name: name.into(),
            iterations: self.iterations,
            total_ms: total,
            avg_ms: avg,
            min_ms: min,
            max_ms: max,
            ops_per_sec: ops,
        }
    }

    fn sample_rows(&self) -> Vec<Vec<i64>> {
        SyntheticTrace::new(vec![11, 12, 13, 14, 12, 15])
            .with_noise(0.05)
            .rows(self.records)
    }

    fn sample_records(&self) -> Vec<AccessRecord> {
        TraceNormalizer::new()
            .normalize(self.sample_rows())
            .map(|trace| trace.records(None))
            .unwrap_or_default()
    }

    pub fn run_normalize_bench(&self) -> BenchmarkResult {
        let rows = self.sample_rows();
        self.measure("normalize", || {
            let _ = TraceNormalizer::new().normalize(rows.clone());
        })
    }

    pub fn run_tree_bench(&self) -> BenchmarkResult {
        let records = self.sample_records();
        self.measure("build_tree", || {
            let _ = PatternTree::from_records(&records, false);
        })
    }

    pub fn run_reduce_bench(&self) -> BenchmarkResult {
        let tree = PatternTree::from_records(&self.sample_records(), false).ok();
        let threshold = self.config.reduce_threshold;
        self.measure("reduce", || {
            if let Some(tree) = &tree {
                let _ = ReducedTree::derive(tree, threshold);
            }
        })
    }

    pub fn run_extract_bench(&self) -> BenchmarkResult {
        let records = self.sample_records();
        let extractor = NGramExtractor::new(self.config.flush_fraction);
        let prepared = PatternTree::from_records(&records, false).and_then(|tree| {
            let reduced = ReducedTree::derive(&tree, self.config.reduce_threshold)?;
            Ok((tree, reduced))
        });

        self.measure("extract", || {
            if let Ok((tree, reduced)) = &prepared {
                let _ = extractor.extract(tree, reduced, &records);
            }
        })
    }

    pub fn run_similarity_bench(&self) -> BenchmarkResult {
        let records = self.sample_records();
        let extractor = NGramExtractor::new(self.config.flush_fraction);
        let entries: Vec<(String, Vec<AccessTriple>)> = PatternTree::from_records(&records, false)
            .and_then(|tree| {
                let reduced = ReducedTree::derive(&tree, 0.0)?;
                extractor.extract(&tree, &reduced, &records)
            })
            .map(|set| {
                set.variants()
                    .iter()
                    .enumerate()
                    .map(|(i, ngram)| (format!("ngram{}", i), ngram.triples()))
                    .collect()
            })
            .unwrap_or_default();

        self.measure("similarity", || {
            let _ = SimilarityMatrix::compute(&entries);
        })
    }

    pub fn run_all(&self) -> Vec<BenchmarkResult> {
        vec![
            self.run_normalize_bench(),
            self.run_tree_bench(),
            self.run_reduce_bench(),
            self.run_extract_bench(),
            self.run_similarity_bench(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_all_reports_every_stage() {
        let runner = BenchmarkRunner::new(1, 300);
        let names: Vec<String> = runner.run_all().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["normalize", "build_tree", "reduce", "extract", "similarity"]);
    }
}
