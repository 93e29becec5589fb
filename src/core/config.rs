//! Configuration for the trace miner

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{MinerError, MinerResult};

/// Main miner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Fraction of total records a node/edge must exceed to survive reduction
    pub reduce_threshold: f64,

    /// Minimum occurrences/records ratio for an n-gram to be emitted
    pub min_occurrence_ratio: f64,

    /// Trailing candidate longer than this fraction of the trace is flushed as an n-gram
    pub flush_fraction: f64,

    /// Nodes visited more than this fraction of records are reported as hot
    pub hot_node_fraction: f64,

    /// Distinguish tree nodes by source line as well
    pub key_includes_source_line: bool,

    /// Instruction pointer to source line table
    pub source_lines: Option<PathBuf>,

    /// Write augmented (block id + stride) traces back to their file
    pub persist_normalized: bool,

    /// Directory for n-gram files; next to the trace when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            reduce_threshold: 0.001,
            min_occurrence_ratio: 0.01,
            flush_fraction: 0.5,
            hot_node_fraction: 0.001,
            key_includes_source_line: false,
            source_lines: Some(PathBuf::from("sourcelines.txt")),
            persist_normalized: true,
            output_dir: None,
        }
    }
}

impl MinerConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> MinerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> MinerResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location: `<config_dir>/memtrace-ngram/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("memtrace-ngram").join("config.toml"))
    }

    /// Reject fractions that are negative or not finite
    pub fn validate(&self) -> MinerResult<()> {
        let fractions = [
            ("reduce_threshold", self.reduce_threshold),
            ("min_occurrence_ratio", self.min_occurrence_ratio),
            ("flush_fraction", self.flush_fraction),
            ("hot_node_fraction", self.hot_node_fraction),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value < 0.0 {
                return Err(MinerError::InvalidArgument(format!(
                    "{} must be a finite value >= 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
