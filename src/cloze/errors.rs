//! Cloze selection error types

use thiserror::Error;

/// Errors that can occur while choosing a cloze span
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Text is empty")]
    EmptyText,

    #[error("Importance model is unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Scorer returned {actual} scores for {expected} words")]
    ScoreCount { expected: usize, actual: usize },
}

/// Result type alias for cloze selection
pub type SelectionResult<T> = Result<T, SelectionError>;
