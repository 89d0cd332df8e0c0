//! File-system storage rooted at the workspace directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Storage, StorageError, StorageResult};
use crate::types::normalize_path;

/// Writes artifacts below a root directory using `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Storage for FsStorage {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }

    async fn is_writable(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file() && !meta.permissions().readonly(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!("[storage] cannot stat {}: {e}", path.display());
                false
            }
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> bool {
        match tokio::fs::write(path, bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[storage] write failed for {}: {e}", path.display());
                false
            }
        }
    }

    async fn create_directories(&self, path: &Path) -> StorageResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}
