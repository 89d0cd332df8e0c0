//! Error types for source-model queries.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Unknown declaration: {0}")]
    UnknownDeclaration(String),

    /// The shared source context can no longer be used (project closed,
    /// model torn down). Work depending on it must stop.
    #[error("Source model invalidated: {reason}")]
    Invalidated { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Invalidated { .. })
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
