use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path is read-only: {}", path.display())]
    ReadOnly { path: PathBuf },

    #[error("Cannot create directory {}: {reason}", path.display())]
    CreateDirectory { path: PathBuf, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
