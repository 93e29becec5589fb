//! Output artifacts: n-gram files, similarity matrices and pass summaries

pub mod ngram_files;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::algorithms::{AccessTriple, SimilarityMatrix};
use crate::core::error::MinerResult;
use crate::trace::loader::write_atomic;

/// Serialize `value` as pretty JSON, replacing `path` atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> MinerResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, &json)
}

/// Write the matrix as text to `path` and as `{ labels, matrix }` JSON next to it
pub fn write_matrix(path: &Path, matrix: &SimilarityMatrix) -> MinerResult<PathBuf> {
    write_atomic(path, &matrix.to_text())?;
    let json_path = path.with_extension("json");
    write_json(&json_path, &matrix.to_document())?;
    Ok(json_path)
}

/// Load n-gram files as labelled entries for [`SimilarityMatrix::compute`].
/// Labels are file names, in the order given.
pub fn load_ngram_entries(paths: &[PathBuf]) -> MinerResult<Vec<(String, Vec<AccessTriple>)>> {
    paths
        .iter()
        .map(|path| -> MinerResult<(String, Vec<AccessTriple>)> {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok((label, ngram_files::read_ngram(path)?))
        })
        .collect()
}
