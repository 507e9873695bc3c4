use std::path::PathBuf;

/// Result type for all fallible library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the library.
///
/// Optional breakdowns that fail are not errors; they are reported as
/// [`Warning`]s alongside the successful part of the result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("unsupported file format: {} (use .csv, .json, or .arrow)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("cannot convert column {0:?} to timestamps")]
    Conversion(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

/// A non-fatal problem: an optional breakdown or enrichment that had to be
/// skipped. Collected and returned alongside the successful part of a
/// result instead of disappearing into the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Which step produced the warning, e.g. `"by_period"`.
    pub scope: String,
    pub message: String,
}

impl Warning {
    #[must_use]
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}
