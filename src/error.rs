//! Error types for the POI voltage import

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Errors that can occur while loading the sheet or reconciling it against the database
#[derive(Debug, Error)]
pub enum ImportError {
    /// Input workbook does not exist
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Workbook exists but could not be read as XLSX
    #[error("failed to read workbook: {0}")]
    ReadError(String),

    /// No header row with the required columns near the top of the sheet
    #[error("missing required column(s) {missing:?} in the first {scanned} row(s)")]
    MissingColumns { missing: Vec<String>, scanned: usize },

    /// PostgreSQL driver error
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    /// Failure reported by a non-PostgreSQL store
    #[error("store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The run failed part way and every pending update was discarded
    #[error("import rolled back, {pending} pending update(s) discarded")]
    RolledBack {
        pending: usize,
        #[source]
        source: Box<ImportError>,
    },
}

impl ImportError {
    /// True when the run reached the database and was rolled back
    pub fn is_rollback(&self) -> bool {
        matches!(self, ImportError::RolledBack { .. })
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::ReadError(err.to_string())
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::ReadError(err.to_string())
    }
}
