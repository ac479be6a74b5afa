//! Error types and load result structures for the table loader.

use std::path::PathBuf;

/// Errors that can occur while loading, validating, or evaluating tables.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Document-level problem (wrong kind, empty id, duplicate id).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The table's rule layout cannot be evaluated deterministically.
    #[error("malformed table '{table}': {reason}")]
    MalformedTable { table: String, reason: String },
}

impl RuleError {
    pub(crate) fn malformed(table: &str, reason: impl Into<String>) -> Self {
        RuleError::MalformedTable {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single table file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Table was successfully loaded.
    Loaded { table_id: String },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
