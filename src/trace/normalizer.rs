//! Trace normalization
//!
//! Turns raw tool rows into full-width rows carrying a dense block id and a
//! per-block stride. Rows that already carry both columns pass through.
//! The block id counter lives in the normalizer so several traces processed
//! by one normalizer never share ids.

use std::collections::BTreeMap;

use super::record::{column, AccessRecord, FULL_WIDTH, RAW_WIDTH};
use super::sourcelines::SourceLineTable;
use crate::core::error::{MinerError, MinerResult};

/// Result of normalizing one trace matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTrace {
    pub rows: Vec<Vec<i64>>,
    /// Whether block id / stride columns were computed in this pass
    pub augmented: bool,
    /// Number of distinct raw blocks seen (0 when passed through)
    pub block_count: usize,
}

impl NormalizedTrace {
    /// Convert rows into canonical access records
    pub fn records(&self, source_lines: Option<&SourceLineTable>) -> Vec<AccessRecord> {
        self.rows
            .iter()
            .map(|row| {
                let record = AccessRecord::from_row(row);
                match source_lines {
                    Some(table) => {
                        let line = table.line_or_blank(record.instruction_pointer).to_string();
                        record.with_source_line(line)
                    }
                    None => record,
                }
            })
            .collect()
    }
}

/// Assigns block ids and strides to raw trace rows
#[derive(Debug, Clone, Default)]
pub struct TraceNormalizer {
    next_block_id: i64,
}

impl TraceNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering blocks from `first`
    pub fn starting_at(first: i64) -> Self {
        Self { next_block_id: first }
    }

    /// Id the next unseen raw block will receive
    pub fn next_block_id(&self) -> i64 {
        self.next_block_id
    }

    /// Normalize a matrix of raw rows. Errors name 1-based row positions.
    pub fn normalize(&mut self, rows: Vec<Vec<i64>>) -> MinerResult<NormalizedTrace> {
        self.normalize_lines(rows, &[])
    }

    /// Normalize rows read from a file; `lines[i]` is the file line of row
    /// `i` and is what errors report.
    pub fn normalize_lines(&mut self, rows: Vec<Vec<i64>>, lines: &[usize]) -> MinerResult<NormalizedTrace> {
        let line_of = |idx: usize| lines.get(idx).copied().unwrap_or(idx + 1);
        let width = check_shape(&rows, &line_of)?;

        if width >= FULL_WIDTH {
            tracing::debug!("Trace already normalized ({} rows, width {})", rows.len(), width);
            return Ok(NormalizedTrace { rows, augmented: false, block_count: 0 });
        }

        // Raw block id -> row indices in trace order, visited in ascending id order
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, row) in rows.iter().enumerate() {
            groups.entry(row[column::RAW_BLOCK]).or_default().push(idx);
        }

        let mut block_ids = vec![0i64; rows.len()];
        let mut strides = vec![0i64; rows.len()];

        // Committed only once every group is assigned
        let mut next_block_id = self.next_block_id;
        for indices in groups.values() {
            let block_id = next_block_id;
            next_block_id += 1;

            for (pos, &idx) in indices.iter().enumerate() {
                block_ids[idx] = block_id;
                if let Some(&next) = indices.get(pos + 1) {
                    let (from, to) = (rows[idx][column::OFFSET], rows[next][column::OFFSET]);
                    strides[idx] = to.checked_sub(from).ok_or_else(|| MinerError::MalformedTrace {
                        line: line_of(next),
                        reason: format!("stride from offset {} to {} overflows", from, to),
                    })?;
                }
            }

            // Last access has no successor: repeat the previous stride
            let n = indices.len();
            if n >= 2 {
                strides[indices[n - 1]] = strides[indices[n - 2]];
            }
        }

        self.next_block_id = next_block_id;
        let block_count = groups.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                row.push(block_ids[idx]);
                row.push(strides[idx]);
                row
            })
            .collect();

        tracing::debug!("Assigned {} block ids, next id {}", block_count, self.next_block_id);

        Ok(NormalizedTrace { rows, augmented: true, block_count })
    }
}

/// Validate that all rows share one supported width and return it
fn check_shape(rows: &[Vec<i64>], line_of: &dyn Fn(usize) -> usize) -> MinerResult<usize> {
    let width = match rows.first() {
        Some(row) => row.len(),
        None => return Err(MinerError::EmptyTrace),
    };

    if width < RAW_WIDTH || (width > RAW_WIDTH && width < FULL_WIDTH) {
        return Err(MinerError::MalformedTrace {
            line: line_of(0),
            reason: format!(
                "expected {} raw or at least {} normalized columns, got {}",
                RAW_WIDTH, FULL_WIDTH, width
            ),
        });
    }

    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(MinerError::MalformedTrace {
            line: line_of(idx),
            reason: format!("expected {} columns like the first row, got {}", width, row.len()),
        });
    }

    Ok(width)
}
