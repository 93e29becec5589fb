//! Pairwise similarity matrix over a labelled set of n-grams

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::distance::{distance, AccessTriple};

/// Square matrix of n-gram distances; cell `(i, j)` is `distance(i, j)`
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    labels: Vec<String>,
    values: Array2<f64>,
}

/// Serializable form consumed by plotting tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDocument {
    pub labels: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    /// Compute all pairwise distances. The diagonal is 0 and the matrix is
    /// filled from the upper triangle since the distance is symmetric.
    pub fn compute(entries: &[(String, Vec<AccessTriple>)]) -> Self {
        let n = entries.len();
        let mut values = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            for j in (i + 1)..n {
                let d = distance(&entries[i].1, &entries[j].1);
                values[[i, j]] = d;
                values[[j, i]] = d;
            }
        }

        tracing::debug!("Computed {}x{} similarity matrix", n, n);

        Self {
            labels: entries.iter().map(|(label, _)| label.clone()).collect(),
            values,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get((i, j)).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Off-diagonal pairs, closest first
    pub fn closest_pairs(&self, limit: usize) -> Vec<(usize, usize, f64)> {
        let n = self.len();
        let mut pairs: Vec<(usize, usize, f64)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| (i, j, self.values[[i, j]]))
            .collect();
        pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        pairs.truncate(limit);
        pairs
    }

    /// Mean off-diagonal distance
    pub fn mean_distance(&self) -> f64 {
        let n = self.len();
        if n < 2 {
            return 0.0;
        }
        self.values.sum() / (n * (n - 1)) as f64
    }

    /// Whitespace-separated rows, one matrix row per line
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in self.values.rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
            out.push_str(&cells.join(" "));
            out.push('\n');
        }
        out
    }

    pub fn to_document(&self) -> MatrixDocument {
        MatrixDocument {
            labels: self.labels.clone(),
            matrix: self.values.rows().into_iter().map(|row| row.to_vec()).collect(),
        }
    }
}
