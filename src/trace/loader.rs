//! Reading and writing the integer trace matrix

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::core::error::{MinerError, MinerResult};

/// Parse whitespace-separated integer rows. Blank lines and `#` comments are skipped.
pub fn parse_matrix(content: &str) -> MinerResult<Vec<Vec<i64>>> {
    Ok(parse_numbered(content)?.rows)
}

/// Parsed rows together with the 1-based file line each came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberedMatrix {
    pub rows: Vec<Vec<i64>>,
    pub lines: Vec<usize>,
}

/// Like [`parse_matrix`], keeping source line numbers for later diagnostics
pub fn parse_numbered(content: &str) -> MinerResult<NumberedMatrix> {
    let mut matrix = NumberedMatrix::default();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row = line
            .split_whitespace()
            .map(|field| {
                field.parse::<i64>().map_err(|_| MinerError::MalformedTrace {
                    line: idx + 1,
                    reason: format!("not an integer: {:?}", field),
                })
            })
            .collect::<MinerResult<Vec<i64>>>()?;
        matrix.rows.push(row);
        matrix.lines.push(idx + 1);
    }

    Ok(matrix)
}

/// Render rows one per line, fields separated by single spaces
pub fn format_matrix(rows: &[Vec<i64>]) -> String {
    let mut out = String::with_capacity(rows.len() * 32);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
    out
}

/// Load a trace matrix from disk
pub fn load_matrix(path: &Path) -> MinerResult<Vec<Vec<i64>>> {
    Ok(load_numbered(path)?.rows)
}

pub fn load_numbered(path: &Path) -> MinerResult<NumberedMatrix> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MinerError::Io(format!("{}: {}", path.display(), e)))?;
    parse_numbered(&content)
}

/// Write a trace matrix, replacing the file atomically
pub fn save_matrix(path: &Path, rows: &[Vec<i64>]) -> MinerResult<()> {
    write_atomic(path, &format_matrix(rows))
}

/// Write to a sibling temp file, then rename over the target
pub fn write_atomic(path: &Path, content: &str) -> MinerResult<()> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, content)
        .map_err(|e| MinerError::Io(format!("{}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        MinerError::Io(format!("{}: {}", path.display(), e))
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matrix() {
        let rows = parse_matrix("# header\n1 2 3\n\n-4  5\t6\n").unwrap();
        assert_eq!(rows, vec![vec![1, 2, 3], vec![-4, 5, 6]]);
    }

    #[test]
    fn test_parse_numbered_keeps_file_lines() {
        let matrix = parse_numbered("# header\n\n1 2 3\n# note\n4 5 6\n").unwrap();
        assert_eq!(matrix.rows, vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(matrix.lines, vec![3, 5]);
    }

    #[test]
    fn test_parse_reports_line() {
        let err = parse_matrix("1 2\n3 x\n").unwrap_err();
        assert!(matches!(err, MinerError::MalformedTrace { line: 2, .. }));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("memtrace-ngram-loader-{}.trace", std::process::id()));
        let rows = vec![vec![1, -2, 3], vec![4, 5, 6]];
        save_matrix(&path, &rows).unwrap();
        let loaded = load_matrix(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, rows);
    }
}
