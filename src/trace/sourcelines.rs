//! Instruction pointer to source line lookup
//!
//! The table comes from an external symbolizer as lines of
//! `<ip> <path>:<line>`. Only the file name is kept and `:` becomes `-`,
//! so `/src/app/kernel.c:42` is stored as `kernel.c-42`.

use std::collections::HashMap;
use std::path::Path;

use crate::core::error::MinerResult;

/// Placeholder for instruction pointers the table does not know
pub const BLANK_SOURCE_LINE: &str = "";

#[derive(Debug, Clone, Default)]
pub struct SourceLineTable {
    lines: HashMap<u64, String>,
}

impl SourceLineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from a file
    pub fn load(path: &Path) -> MinerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::parse(&content);
        tracing::info!("Loaded {} source lines from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse table text, skipping lines that do not match the format
    pub fn parse(content: &str) -> Self {
        let mut lines = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let (Some(ip), Some(location)) = (fields.next(), fields.next()) else {
                if !line.trim().is_empty() {
                    tracing::warn!("sourcelines: skipping line {}: missing location", idx + 1);
                }
                continue;
            };
            let Ok(ip) = ip.parse::<u64>() else {
                tracing::warn!("sourcelines: skipping line {}: bad instruction pointer {:?}", idx + 1, ip);
                continue;
            };

            let file = location.rsplit('/').next().unwrap_or(location);
            lines.insert(ip, file.replace(':', "-"));
        }

        Self { lines }
    }

    /// Source line for an instruction pointer, if known
    pub fn get(&self, ip: u64) -> Option<&str> {
        self.lines.get(&ip).map(String::as_str)
    }

    /// Source line for an instruction pointer, blank when unknown
    pub fn line_or_blank(&self, ip: u64) -> &str {
        self.get(ip).unwrap_or(BLANK_SOURCE_LINE)
    }

    pub fn insert(&mut self, ip: u64, line: impl Into<String>) {
        self.lines.insert(ip, line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
