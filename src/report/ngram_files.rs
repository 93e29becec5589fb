//! N-gram output files
//!
//! For a trace `<prefix>` every emitted n-gram `k` goes to `<prefix>.ngram<k>`
//! with one `block stride is_read` line per element. Occurrence counts go to
//! `<prefix>.n`, one per line in the same order.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::algorithms::{AccessTriple, NGram};
use crate::core::error::{MinerError, MinerResult};
use crate::trace::loader::write_atomic;

const NGRAM_MARKER: &str = ".ngram";

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn ngram_path(prefix: &Path, index: usize) -> PathBuf {
    with_suffix(prefix, &format!("{}{}", NGRAM_MARKER, index))
}

pub fn counts_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".n")
}

pub fn summary_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".summary.json")
}

/// Text of one n-gram file
pub fn format_ngram(ngram: &NGram) -> String {
    let mut out = String::new();
    for element in &ngram.elements {
        let _ = writeln!(
            out,
            "{} {} {}",
            element.key.block_id,
            element.key.stride,
            u8::from(element.is_read)
        );
    }
    out
}

/// Write all n-gram files plus the counts file. Files left over from an
/// earlier run with more n-grams are removed.
pub fn write_ngrams(prefix: &Path, ngrams: &[&NGram]) -> MinerResult<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(ngrams.len());
    let mut counts = String::new();

    for (index, ngram) in ngrams.iter().enumerate() {
        let path = ngram_path(prefix, index);
        write_atomic(&path, &format_ngram(ngram))?;
        let _ = writeln!(counts, "{:.6}", ngram.occurrences as f64);
        paths.push(path);
    }
    write_atomic(&counts_path(prefix), &counts)?;

    let mut stale = ngrams.len();
    loop {
        let path = ngram_path(prefix, stale);
        if !path.exists() {
            break;
        }
        std::fs::remove_file(&path)?;
        tracing::debug!("Removed stale {}", path.display());
        stale += 1;
    }

    Ok(paths)
}

/// Parse n-gram file text into alignment triples
pub fn parse_ngram(content: &str) -> MinerResult<Vec<AccessTriple>> {
    let mut triples = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let malformed = |reason: String| MinerError::MalformedTrace { line: idx + 1, reason };
        let fields: Vec<i64> = line
            .split_whitespace()
            .map(|field| field.parse::<i64>().map_err(|_| malformed(format!("not an integer: {:?}", field))))
            .collect::<MinerResult<_>>()?;

        match fields.as_slice() {
            &[block, offset, access] => triples.push(AccessTriple::new(block, offset, access != 0)),
            other => return Err(malformed(format!("expected 3 fields, got {}", other.len()))),
        }
    }

    if triples.is_empty() {
        return Err(MinerError::EmptyTrace);
    }
    Ok(triples)
}

pub fn read_ngram(path: &Path) -> MinerResult<Vec<AccessTriple>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MinerError::Io(format!("{}: {}", path.display(), e)))?;
    parse_ngram(&content)
}

pub fn read_counts(path: &Path) -> MinerResult<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MinerError::Io(format!("{}: {}", path.display(), e)))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.trim().parse::<f64>().map_err(|_| MinerError::MalformedTrace {
                line: idx + 1,
                reason: format!("not a count: {:?}", line),
            })
        })
        .collect()
}

/// `<anything>.ngram<digits>`; temp files and other suffixes do not match
fn is_ngram_name(name: &str) -> bool {
    match name.rfind(NGRAM_MARKER) {
        Some(pos) => {
            let index = &name[pos + NGRAM_MARKER.len()..];
            !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// N-gram files in a directory, sorted by name
pub fn discover(dir: &Path) -> MinerResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ngram = path
            .file_name()
            .map(|name| is_ngram_name(&name.to_string_lossy()))
            .unwrap_or(false);
        if is_ngram && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{NGramElement, NodeKey};

    fn ngram(items: &[(i64, i64, bool)], occurrences: u64) -> NGram {
        NGram {
            elements: items
                .iter()
                .map(|&(b, s, r)| NGramElement { key: NodeKey::new(b, s, 8), is_read: r })
                .collect(),
            occurrences,
        }
    }

    #[test]
    fn test_format_and_parse() {
        let n = ngram(&[(3, -8, true), (4, 16, false)], 5);
        let text = format_ngram(&n);
        assert_eq!(text, "3 -8 1\n4 16 0\n");
        assert_eq!(parse_ngram(&text).unwrap(), n.triples());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_ngram("1 2\n"), Err(MinerError::MalformedTrace { line: 1, .. })));
        assert!(matches!(parse_ngram("1 2 1\n1 x 0\n"), Err(MinerError::MalformedTrace { line: 2, .. })));
        assert_eq!(parse_ngram("\n"), Err(MinerError::EmptyTrace));
    }

    #[test]
    fn test_paths() {
        let prefix = Path::new("/tmp/run/app.trace");
        assert_eq!(ngram_path(prefix, 2), PathBuf::from("/tmp/run/app.trace.ngram2"));
        assert_eq!(counts_path(prefix), PathBuf::from("/tmp/run/app.trace.n"));
    }

    #[test]
    fn test_write_discover_and_prune() {
        let dir = std::env::temp_dir().join(format!("memtrace-ngram-files-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("t");

        let a = ngram(&[(1, 0, true)], 3);
        let b = ngram(&[(2, 0, true), (3, 4, false)], 7);
        write_ngrams(&prefix, &[&a, &b]).unwrap();
        assert_eq!(discover(&dir).unwrap().len(), 2);
        assert_eq!(read_counts(&counts_path(&prefix)).unwrap(), vec![3.0, 7.0]);

        write_ngrams(&prefix, &[&b]).unwrap();
        let found = discover(&dir).unwrap();
        assert_eq!(found, vec![ngram_path(&prefix, 0)]);
        assert_eq!(read_ngram(&found[0]).unwrap(), b.triples());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_discover_skips_temp_and_foreign_names() {
        let dir = std::env::temp_dir().join(format!("memtrace-ngram-discover-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        for name in ["x.ngram0.tmp", "x.ngram1", "x.ngram", "x.ngramfoo", "x.n", "x.ngram12"] {
            std::fs::write(dir.join(name), "1 0 1\n").unwrap();
        }

        let found = discover(&dir).unwrap();
        assert_eq!(found, vec![dir.join("x.ngram1"), dir.join("x.ngram12")]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
