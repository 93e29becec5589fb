//! Canonical access records and the raw trace row layout

use serde::{Deserialize, Serialize};

/// Column positions in a raw trace row.
pub mod column {
    pub const INSTRUCTION_POINTER: usize = 0;
    pub const ADDRESS: usize = 1;
    pub const OFFSET: usize = 2;
    pub const RAW_BLOCK: usize = 3;
    pub const ACCESS_TYPE: usize = 4;
    pub const AUX: usize = 5;
    pub const OBJECT_SIZE: usize = 6;
    pub const BLOCK_ID: usize = 7;
    pub const STRIDE: usize = 8;
}

/// Width of a row as written by the instrumentation tool
pub const RAW_WIDTH: usize = 7;

/// Width of a row once block ids and strides are appended
pub const FULL_WIDTH: usize = 9;

/// One memory access, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub instruction_pointer: u64,
    /// Dense block id assigned by the normalizer
    pub block_id: i64,
    /// Offset delta to the next access of the same block
    pub stride: i64,
    pub object_size: i64,
    pub is_read: bool,
    pub source_line: Option<String>,
}

impl AccessRecord {
    /// Build a record from a full-width row. The caller guarantees the width.
    pub fn from_row(row: &[i64]) -> Self {
        Self {
            instruction_pointer: row[column::INSTRUCTION_POINTER] as u64,
            block_id: row[column::BLOCK_ID],
            stride: row[column::STRIDE],
            object_size: row[column::OBJECT_SIZE],
            is_read: row[column::ACCESS_TYPE] != 0,
            source_line: None,
        }
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }
}
