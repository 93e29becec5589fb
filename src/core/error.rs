//! Error types shared by every stage of the mining pipeline

use std::fmt;

/// Pipeline stages that downstream operations depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Trace rows loaded and normalized into access records
    Records,
    /// Pattern tree built from the records
    Tree,
    /// Reduced tree derived for some threshold
    ReducedTree,
    /// N-grams extracted
    NGrams,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Records => "load_records",
            Stage::Tree => "build_tree",
            Stage::ReducedTree => "reduce",
            Stage::NGrams => "extract",
        };
        f.write_str(name)
    }
}

/// Error type for trace mining operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MinerError {
    /// A trace row is missing required columns or holds a non-integer field
    MalformedTrace { line: usize, reason: String },
    /// The trace holds no records, nothing to mine
    EmptyTrace,
    /// A stage ran before its prerequisite
    StateNotReady(Stage),
    /// Invalid argument provided (threshold, ratio, ...)
    InvalidArgument(String),
    /// I/O error while reading or writing a file
    Io(String),
    /// Configuration could not be parsed or serialized
    Config(String),
    /// An arena outgrew its index type
    CapacityExceeded { what: &'static str, limit: u64 },
}

impl fmt::Display for MinerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerError::MalformedTrace { line, reason } => {
                write!(f, "Malformed trace at line {}: {}", line, reason)
            }
            MinerError::EmptyTrace => write!(f, "Empty trace: no records to mine"),
            MinerError::StateNotReady(stage) => {
                write!(f, "State not ready: run {}() first", stage)
            }
            MinerError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            MinerError::Io(msg) => write!(f, "I/O error: {}", msg),
            MinerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MinerError::CapacityExceeded { what, limit } => {
                write!(f, "Capacity exceeded: more than {} {}", limit, what)
            }
        }
    }
}

impl std::error::Error for MinerError {}

impl From<std::io::Error> for MinerError {
    fn from(err: std::io::Error) -> Self {
        MinerError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MinerError {
    fn from(err: toml::de::Error) -> Self {
        MinerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MinerError {
    fn from(err: toml::ser::Error) -> Self {
        MinerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MinerError {
    fn from(err: serde_json::Error) -> Self {
        MinerError::Io(err.to_string())
    }
}

/// Result type alias for mining operations.
pub type MinerResult<T> = Result<T, MinerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_not_ready_names_stage() {
        let err = MinerError::StateNotReady(Stage::Tree);
        assert_eq!(err.to_string(), "State not ready: run build_tree() first");
    }

    #[test]
    fn test_malformed_trace_message() {
        let err = MinerError::MalformedTrace { line: 3, reason: "expected 7 columns, got 5".into() };
        assert!(err.to_string().contains("line 3"));
    }
}
