//! Error types for marker index operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("Failed to enumerate files: {0}")]
    Enumerate(#[source] SourceError),

    #[error("Index build cancelled")]
    Cancelled,

    #[error("Index worker failed: {0}")]
    Worker(String),
}

impl IndexError {
    /// Whether the error means the source context itself is unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            IndexError::Scan { source, .. } | IndexError::Enumerate(source) => source.is_fatal(),
            IndexError::Cancelled | IndexError::Worker(_) => false,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
