//! Deck export error types

use thiserror::Error;

/// Errors that can occur while writing an `.apkg` package
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not move package into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Result type alias for deck export
pub type Result<T> = std::result::Result<T, ExportError>;
