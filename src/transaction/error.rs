//! Error types for the transaction coordinator.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum TransactionError {
    /// A unit of work asked for the current transaction outside
    /// `run_in_transaction`. Always a programming error.
    #[error("No transaction is bound to the current task")]
    NoTransaction,

    #[error("Transaction {id} is closed")]
    Closed { id: u64 },

    #[error("Failed to produce content for {}: {reason}", path.display())]
    Produce { path: PathBuf, reason: String },

    #[error("Write failed for {}", path.display())]
    WriteFailed { path: PathBuf },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type TransactionResult<T> = Result<T, TransactionError>;
