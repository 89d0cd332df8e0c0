//! Storage collaborator: the layer that durably writes artifact bytes.
//!
//! The transaction coordinator only needs three things from storage: a
//! writability check for the commit gate, a byte write that reports success,
//! and directory creation for new artifact locations.

mod error;
mod fs;
mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use error::{StorageError, StorageResult};
pub use fs::FsStorage;
pub use memory::MemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Map a write target to its on-disk location.
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Whether `path` may be written. A missing file is writable.
    async fn is_writable(&self, path: &Path) -> bool;

    /// Write `bytes` verbatim to `path`. Returns `true` on success.
    async fn write(&self, path: &Path, bytes: &[u8]) -> bool;

    /// Create `path` and all missing parents.
    async fn create_directories(&self, path: &Path) -> StorageResult<()>;
}
