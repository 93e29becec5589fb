//! Mining pipeline
//!
//! `MiningPass` owns every piece of state for one trace: the records, the
//! pattern tree, the reduced tree and the n-grams. Stages must run in order;
//! asking for a stage whose prerequisite is missing returns
//! `StateNotReady` naming that prerequisite. A fresh pass is built for every
//! trace so nothing leaks between traces.
//!
//! `TraceMiner` drives passes over trace files and writes their outputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::MinerConfig;
use super::error::{MinerError, MinerResult, Stage};
use crate::algorithms::{NGram, NGramExtractor, NGramSet, PatternTree, ReducedTree, TreeStats};
use crate::report::{self, ngram_files};
use crate::trace::{loader, AccessRecord, SourceLineTable, TraceNormalizer};

/// Node visited often enough to be reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotNode {
    pub key: String,
    pub visits: u64,
    pub is_read: bool,
}

/// Per-n-gram line of a pass summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedNGram {
    pub index: usize,
    pub length: usize,
    pub occurrences: u64,
    pub ratio: f64,
}

/// Serializable overview of one mining pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub label: String,
    pub generated_at: String,
    pub tree: TreeStats,
    pub reduce_threshold: Option<f64>,
    pub reduced_nodes: usize,
    pub reduced_edges: usize,
    pub hot_nodes: Vec<HotNode>,
    pub ngram_variants: usize,
    pub emitted: Vec<EmittedNGram>,
}

/// State of one trace-processing pass
#[derive(Debug, Clone)]
pub struct MiningPass {
    label: String,
    config: MinerConfig,
    records: Option<Vec<AccessRecord>>,
    tree: Option<PatternTree>,
    reduced: Option<ReducedTree>,
    ngrams: Option<NGramSet>,
}

impl MiningPass {
    pub fn new(label: impl Into<String>, config: MinerConfig) -> Self {
        Self {
            label: label.into(),
            config,
            records: None,
            tree: None,
            reduced: None,
            ngrams: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Install the canonical stream; discards anything derived from a previous one
    pub fn load_records(&mut self, records: Vec<AccessRecord>) -> MinerResult<()> {
        if records.is_empty() {
            return Err(MinerError::EmptyTrace);
        }
        tracing::debug!("{}: loaded {} records", self.label, records.len());
        self.records = Some(records);
        self.tree = None;
        self.reduced = None;
        self.ngrams = None;
        Ok(())
    }

    pub fn build_tree(&mut self) -> MinerResult<&PatternTree> {
        let records = self.records.as_ref().ok_or(MinerError::StateNotReady(Stage::Records))?;
        let tree = PatternTree::from_records(records, self.config.key_includes_source_line)?;

        tracing::info!(
            "{}: pattern tree has {} nodes and {} edge contexts",
            self.label,
            tree.node_count(),
            tree.edge_count()
        );

        self.reduced = None;
        self.ngrams = None;
        Ok(self.tree.insert(tree))
    }

    /// Derive the reduced tree; can be re-run with another threshold
    pub fn reduce(&mut self, threshold: f64) -> MinerResult<&ReducedTree> {
        let tree = self.tree.as_ref().ok_or(MinerError::StateNotReady(Stage::Tree))?;
        let reduced = ReducedTree::derive(tree, threshold)?;

        tracing::info!(
            "{}: reduced tree at {} keeps {} nodes and {} edge contexts",
            self.label,
            threshold,
            reduced.node_count(),
            reduced.edge_count()
        );

        self.ngrams = None;
        Ok(self.reduced.insert(reduced))
    }

    pub fn extract(&mut self) -> MinerResult<&NGramSet> {
        let reduced = self.reduced.as_ref().ok_or(MinerError::StateNotReady(Stage::ReducedTree))?;
        let tree = self.tree.as_ref().ok_or(MinerError::StateNotReady(Stage::Tree))?;
        let records = self.records.as_ref().ok_or(MinerError::StateNotReady(Stage::Records))?;

        let set = NGramExtractor::new(self.config.flush_fraction).extract(tree, reduced, records)?;
        tracing::info!(
            "{}: {} n-gram variants, {} above ratio {}",
            self.label,
            set.len(),
            set.emitted(self.config.min_occurrence_ratio).len(),
            self.config.min_occurrence_ratio
        );

        Ok(self.ngrams.insert(set))
    }

    /// N-grams passing the occurrence-ratio filter, in discovery order
    pub fn emitted(&self) -> MinerResult<Vec<&NGram>> {
        let set = self.ngrams()?;
        Ok(set.emitted(self.config.min_occurrence_ratio))
    }

    /// Run every stage with the configured threshold
    pub fn run(&mut self) -> MinerResult<Vec<NGram>> {
        self.build_tree()?;
        self.reduce(self.config.reduce_threshold)?;
        self.extract()?;
        Ok(self.emitted()?.into_iter().cloned().collect())
    }

    pub fn records(&self) -> MinerResult<&[AccessRecord]> {
        self.records.as_deref().ok_or(MinerError::StateNotReady(Stage::Records))
    }

    pub fn tree(&self) -> MinerResult<&PatternTree> {
        self.tree.as_ref().ok_or(MinerError::StateNotReady(Stage::Tree))
    }

    pub fn reduced(&self) -> MinerResult<&ReducedTree> {
        self.reduced.as_ref().ok_or(MinerError::StateNotReady(Stage::ReducedTree))
    }

    pub fn ngrams(&self) -> MinerResult<&NGramSet> {
        self.ngrams.as_ref().ok_or(MinerError::StateNotReady(Stage::NGrams))
    }

    pub fn summary(&self) -> MinerResult<PassSummary> {
        let tree = self.tree()?;

        let hot_nodes = tree
            .hot_nodes(self.config.hot_node_fraction)
            .into_iter()
            .map(|(id, visits)| {
                let node = tree.node(id);
                HotNode { key: node.key.to_string(), visits, is_read: node.is_read }
            })
            .collect();

        let (ngram_variants, emitted) = match &self.ngrams {
            Some(set) => {
                let emitted = set
                    .emitted(self.config.min_occurrence_ratio)
                    .into_iter()
                    .enumerate()
                    .map(|(index, ngram)| EmittedNGram {
                        index,
                        length: ngram.len(),
                        occurrences: ngram.occurrences,
                        ratio: ngram.ratio(set.total_records()),
                    })
                    .collect();
                (set.len(), emitted)
            }
            None => (0, Vec::new()),
        };

        Ok(PassSummary {
            label: self.label.clone(),
            generated_at: chrono::Local::now().to_rfc3339(),
            tree: tree.stats(),
            reduce_threshold: self.reduced.as_ref().map(ReducedTree::threshold),
            reduced_nodes: self.reduced.as_ref().map_or(0, ReducedTree::node_count),
            reduced_edges: self.reduced.as_ref().map_or(0, ReducedTree::edge_count),
            hot_nodes,
            ngram_variants,
            emitted,
        })
    }
}

/// Outcome of mining one trace file
#[derive(Debug, Clone)]
pub struct MineReport {
    pub trace: PathBuf,
    pub ngram_files: Vec<PathBuf>,
    pub counts_file: PathBuf,
    pub summary: PassSummary,
}

/// Mines trace files one after another. The normalizer is shared so block
/// ids stay distinct across the whole batch.
#[derive(Debug, Clone)]
pub struct TraceMiner {
    config: MinerConfig,
    normalizer: TraceNormalizer,
    source_lines: Option<SourceLineTable>,
}

impl TraceMiner {
    /// Build a miner, loading the configured source-line table if present
    pub fn new(config: MinerConfig) -> MinerResult<Self> {
        config.validate()?;

        let source_lines = match &config.source_lines {
            Some(path) if path.exists() => Some(SourceLineTable::load(path)?),
            Some(path) => {
                tracing::warn!("Source-line table {} not found, lines left blank", path.display());
                None
            }
            None => None,
        };

        Ok(Self { config, normalizer: TraceNormalizer::new(), source_lines })
    }

    pub fn with_source_lines(mut self, table: SourceLineTable) -> Self {
        self.source_lines = Some(table);
        self
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Load, normalize and convert a trace file to canonical records.
    /// A freshly augmented trace is written back when configured to.
    pub fn load_records(&mut self, path: &Path) -> MinerResult<Vec<AccessRecord>> {
        let matrix = loader::load_numbered(path)?;
        let trace = self.normalizer.normalize_lines(matrix.rows, &matrix.lines)?;

        if trace.augmented && self.config.persist_normalized {
            loader::save_matrix(path, &trace.rows)?;
            tracing::info!("Wrote normalized trace back to {}", path.display());
        }

        Ok(trace.records(self.source_lines.as_ref()))
    }

    /// Run a full pass over one trace and write its outputs
    pub fn mine_file(&mut self, path: &Path) -> MinerResult<MineReport> {
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let records = self.load_records(path)?;
        let mut pass = MiningPass::new(label, self.config.clone());
        pass.load_records(records)?;
        let ngrams = pass.run()?;
        let summary = pass.summary()?;

        if let Some(dir) = &self.config.output_dir {
            std::fs::create_dir_all(dir)?;
        }
        let prefix = self.output_prefix(path);
        let refs: Vec<&NGram> = ngrams.iter().collect();
        let ngram_files = ngram_files::write_ngrams(&prefix, &refs)?;
        report::write_json(&ngram_files::summary_path(&prefix), &summary)?;

        tracing::info!("{}: wrote {} n-gram files", summary.label, ngram_files.len());

        Ok(MineReport {
            trace: path.to_path_buf(),
            ngram_files,
            counts_file: ngram_files::counts_path(&prefix),
            summary,
        })
    }

    /// Output files are named after the trace, in `output_dir` when set
    pub fn output_prefix(&self, trace: &Path) -> PathBuf {
        match (&self.config.output_dir, trace.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => trace.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle_records(count: usize) -> Vec<AccessRecord> {
        (0..count)
            .map(|i| AccessRecord {
                instruction_pointer: 0x400000 + (i % 3) as u64,
                block_id: [1, 2, 3][i % 3],
                stride: 0,
                object_size: 64,
                is_read: true,
                source_line: None,
            })
            .collect()
    }

    fn unique_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("memtrace-ngram-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_stages_must_run_in_order() {
        let mut pass = MiningPass::new("t", MinerConfig::default());
        assert_eq!(pass.build_tree().unwrap_err(), MinerError::StateNotReady(Stage::Records));

        pass.load_records(cycle_records(30)).unwrap();
        assert_eq!(pass.reduce(0.0).unwrap_err(), MinerError::StateNotReady(Stage::Tree));

        pass.build_tree().unwrap();
        assert_eq!(pass.extract().unwrap_err(), MinerError::StateNotReady(Stage::ReducedTree));
        assert_eq!(pass.emitted().unwrap_err(), MinerError::StateNotReady(Stage::NGrams));

        pass.reduce(0.0).unwrap();
        assert!(pass.extract().is_ok());
    }

    #[test]
    fn test_empty_records_rejected() {
        let mut pass = MiningPass::new("t", MinerConfig::default());
        assert_eq!(pass.load_records(Vec::new()), Err(MinerError::EmptyTrace));
    }

    #[test]
    fn test_cyclic_trace_end_to_end() {
        let mut pass = MiningPass::new("cycle", MinerConfig::default());
        pass.load_records(cycle_records(100)).unwrap();
        let ngrams = pass.run().unwrap();

        assert_eq!(ngrams.len(), 1);
        assert_eq!(ngrams[0].len(), 3);
        assert_eq!(ngrams[0].occurrences, 32);

        let summary = pass.summary().unwrap();
        assert_eq!(summary.tree.total_records, 100);
        assert_eq!(summary.emitted.len(), 1);
        assert!((summary.emitted[0].ratio - 0.32).abs() < 1e-12);
        assert_eq!(summary.hot_nodes.len(), 3);
    }

    #[test]
    fn test_rereduce_clears_ngrams() {
        let mut pass = MiningPass::new("t", MinerConfig::default());
        pass.load_records(cycle_records(60)).unwrap();
        pass.build_tree().unwrap();
        pass.reduce(0.0).unwrap();
        pass.extract().unwrap();
        pass.reduce(0.5).unwrap();
        assert!(pass.ngrams().is_err());
        assert_eq!(pass.reduced().unwrap().node_count(), 0);
    }

    #[test]
    fn test_mine_file_writes_outputs() {
        let dir = unique_dir("mine");
        let trace = dir.join("loop.trace");

        // Raw 7-column rows: three blocks read in turn, offsets stepping by 8
        let rows: Vec<Vec<i64>> = (0..90)
            .map(|i| vec![0x400 + (i % 3), 0, (i / 3) * 8, 1000 + (i % 3), 1, 0, 8])
            .collect();
        loader::save_matrix(&trace, &rows).unwrap();

        let config = MinerConfig { source_lines: None, ..Default::default() };
        let mut miner = TraceMiner::new(config).unwrap();
        let report = miner.mine_file(&trace).unwrap();

        assert_eq!(report.ngram_files.len(), 1);
        let triples = ngram_files::read_ngram(&report.ngram_files[0]).unwrap();
        assert_eq!(triples.len(), 3);
        assert!(triples.iter().all(|t| t.offset == 8 && t.is_read));

        let counts = ngram_files::read_counts(&report.counts_file).unwrap();
        assert_eq!(counts, vec![report.summary.emitted[0].occurrences as f64]);

        // The trace now carries block ids and strides
        let persisted = loader::load_matrix(&trace).unwrap();
        assert_eq!(persisted[0].len(), 9);

        // A second run reads the normalized file unchanged
        let again = miner.mine_file(&trace).unwrap();
        assert_eq!(again.summary.emitted, report.summary.emitted);
        assert_eq!(loader::load_matrix(&trace).unwrap(), persisted);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_fails_without_touching_others() {
        let dir = unique_dir("batch");
        let good = dir.join("good.trace");
        let bad = dir.join("bad.trace");

        let rows: Vec<Vec<i64>> = (0..60).map(|i| vec![1, 0, i * 4, 7 + (i % 2), 1, 0, 4]).collect();
        loader::save_matrix(&good, &rows).unwrap();
        std::fs::write(&bad, "1 2 3\n").unwrap();

        let config = MinerConfig { source_lines: None, ..Default::default() };
        let mut miner = TraceMiner::new(config).unwrap();
        let first = miner.mine_file(&good).unwrap();
        let before = std::fs::read_to_string(&first.counts_file).unwrap();

        assert!(matches!(miner.mine_file(&bad), Err(MinerError::MalformedTrace { .. })));
        assert_eq!(std::fs::read_to_string(&first.counts_file).unwrap(), before);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_row_reports_file_line() {
        let dir = unique_dir("lines");
        let trace = dir.join("commented.trace");
        std::fs::write(&trace, "# ip addr offset block read aux size\n\n1 0 0 5 1 0 8\n1 0 4\n").unwrap();

        let config = MinerConfig { source_lines: None, ..Default::default() };
        let mut miner = TraceMiner::new(config).unwrap();
        let err = miner.load_records(&trace).unwrap_err();
        assert!(matches!(err, MinerError::MalformedTrace { line: 4, .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
