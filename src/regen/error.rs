//! Error types for the regeneration pipeline.

use thiserror::Error;

use crate::source::SourceError;
use crate::transaction::TransactionError;

/// Failure of one handler invocation.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler for {declaration} failed: {reason}")]
    Failed { declaration: String, reason: String },

    /// The shared context became unusable; the rest of the cycle is
    /// abandoned.
    #[error("Fatal handler error: {0}")]
    Fatal(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl HandlerError {
    pub fn is_fatal(&self) -> bool {
        match self {
            HandlerError::Fatal(_) => true,
            HandlerError::Source(e) => e.is_fatal(),
            HandlerError::Transaction(TransactionError::NoTransaction) => true,
            _ => false,
        }
    }
}

/// Failure of one factory's discovery pass.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Discovery worker failed: {0}")]
    Worker(String),

    #[error("{0}")]
    Other(String),
}
