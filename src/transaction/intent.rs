//! Deferred file writes.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{TransactionError, TransactionResult};
use crate::storage::Storage;
use crate::types::normalize_path;

type ContentProducer = Box<dyn FnOnce() -> anyhow::Result<Vec<u8>> + Send>;

/// A not-yet-applied write: target path plus the producer of its bytes.
///
/// Content is produced lazily at commit time so a transaction holding many
/// intents does not hold their rendered contents. Two intents are equal when
/// they target the same path.
pub struct WriteIntent {
    target: PathBuf,
    producer: ContentProducer,
}

impl WriteIntent {
    pub fn new<F>(target: impl Into<PathBuf>, producer: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Vec<u8>> + Send + 'static,
    {
        Self {
            target: normalize_path(&target.into()),
            producer: Box::new(producer),
        }
    }

    /// An intent whose content is already known.
    pub fn with_bytes(target: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self::new(target, move || Ok(bytes))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Produce the content and write it to `resolved`.
    ///
    /// The producer runs on a blocking worker; a panic inside it fails this
    /// member only.
    pub(crate) async fn commit(self, resolved: &Path, storage: &dyn Storage) -> TransactionResult<()> {
        let produce_error = |reason: String| TransactionError::Produce {
            path: resolved.to_path_buf(),
            reason,
        };
        let bytes = match tokio::task::spawn_blocking(self.producer).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(produce_error(format!("{e:#}"))),
            Err(e) if e.is_panic() => return Err(produce_error("producer panicked".to_string())),
            Err(e) => return Err(produce_error(e.to_string())),
        };

        if let Some(parent) = resolved.parent() {
            if !parent.as_os_str().is_empty() {
                storage.create_directories(parent).await?;
            }
        }

        if storage.write(resolved, &bytes).await {
            Ok(())
        } else {
            Err(TransactionError::WriteFailed {
                path: resolved.to_path_buf(),
            })
        }
    }
}

impl PartialEq for WriteIntent {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for WriteIntent {}

impl fmt::Debug for WriteIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteIntent")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
