//! In-memory storage used for embedding and tests.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Storage, StorageResult};

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, Vec<u8>>,
    directories: HashSet<PathBuf>,
    read_only: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
    /// Successful writes in commit order.
    log: Vec<PathBuf>,
}

/// Storage that keeps every written file in a map.
///
/// Paths can be flagged read-only (rejected by the commit gate) or failing
/// (accepted by the gate but the write itself reports failure).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, path: impl Into<PathBuf>) {
        self.state.lock().read_only.insert(path.into());
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.state.lock().failing.insert(path.into());
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(path.into(), bytes.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().files.contains_key(path.as_ref())
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// Paths of successful writes, in the order they landed.
    pub fn write_log(&self) -> Vec<PathBuf> {
        self.state.lock().log.clone()
    }

    pub fn has_directory(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().directories.contains(path.as_ref())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn is_writable(&self, path: &Path) -> bool {
        !self.state.lock().read_only.contains(path)
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> bool {
        let mut state = self.state.lock();
        if state.failing.contains(path) || state.read_only.contains(path) {
            return false;
        }
        state.files.insert(path.to_path_buf(), bytes.to_vec());
        state.log.push(path.to_path_buf());
        true
    }

    async fn create_directories(&self, path: &Path) -> StorageResult<()> {
        let mut state = self.state.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state.directories.insert(ancestor.to_path_buf());
        }
        Ok(())
    }
}
