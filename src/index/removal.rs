//! Two-phase handling of deletes, moves and renames.
//!
//! Storage-level notifications are intercepted before the change lands. At
//! that point the old path still matches index keys, so `prepare` computes
//! everything that must be dropped. `apply` runs after the storage layer
//! committed the change and never looks at the file system.

use std::path::{Path, PathBuf};

use super::MarkerIndex;
use crate::types::normalize_path;

/// A storage-level structural change, as seen before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Deleted(PathBuf),
    /// Covers both moves and renames.
    Moved { from: PathBuf, to: PathBuf },
}

/// Index entries to drop once the storage change is committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PendingRemoval {
    /// Indexed files at or below the old location.
    pub removed: Vec<PathBuf>,
    /// New locations of moved files; they need a fresh scan.
    pub relocated: Vec<PathBuf>,
}

impl PendingRemoval {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.relocated.is_empty()
    }
}

impl MarkerIndex {
    /// Phase one: compute what `event` removes, against the current keys.
    pub fn prepare_removal(&self, event: &StorageEvent) -> PendingRemoval {
        let (from, to) = match event {
            StorageEvent::Deleted(path) => (normalize_path(path), None),
            StorageEvent::Moved { from, to } => (normalize_path(from), Some(normalize_path(to))),
        };

        let removed = self.indexed_below(&from);
        let relocated = match to {
            Some(to) => removed
                .iter()
                .filter_map(|old| old.strip_prefix(&from).ok())
                .map(|rel| {
                    if rel.as_os_str().is_empty() {
                        to.clone()
                    } else {
                        to.join(rel)
                    }
                })
                .collect(),
            None => Vec::new(),
        };

        crate::debug_event!(
            "index",
            "prepared removal",
            "{} removed, {} relocated",
            removed.len(),
            relocated.len()
        );
        PendingRemoval { removed, relocated }
    }

    /// Phase two: drop the prepared entries. Returns the relocated paths the
    /// caller should re-index.
    pub fn apply_removal(&self, pending: PendingRemoval) -> Vec<PathBuf> {
        let dropped = self.remove_paths(&pending.removed);
        if dropped > 0 {
            crate::log_event!("index", "removed", "{dropped} files");
        }
        pending.relocated
    }

    /// Indexed files equal to `path` or inside it when it is a directory.
    fn indexed_below(&self, path: &Path) -> Vec<PathBuf> {
        let mut below: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(path))
            .map(|entry| entry.key().clone())
            .collect();
        below.sort();
        below
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IgnorePolicy;
    use crate::source::{MemoryDeclaration, MemorySourceModel, SourceModel};
    use crate::types::Scope;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn built_index() -> (Arc<MemorySourceModel>, MarkerIndex) {
        let model = Arc::new(MemorySourceModel::new());
        model.set_file("src/a/X.java", vec![MemoryDeclaration::new("a.X").marker("Marker", "1")]);
        model.set_file("src/a/Y.java", vec![MemoryDeclaration::new("a.Y").marker("Marker", "2")]);
        model.set_file("src/b/Z.java", vec![MemoryDeclaration::new("b.Z").marker("Marker", "3")]);
        let index = MarkerIndex::new(
            Arc::clone(&model) as Arc<dyn SourceModel>,
            "Marker",
            IgnorePolicy::none(),
        );
        index.build(&Scope::Project, &CancellationToken::new());
        (model, index)
    }

    #[test]
    fn test_delete_single_file() {
        let (_model, index) = built_index();
        let pending = index.prepare_removal(&StorageEvent::Deleted("src/a/X.java".into()));
        assert_eq!(pending.removed, vec![PathBuf::from("src/a/X.java")]);
        assert!(pending.relocated.is_empty());

        // Nothing changes until the removal is applied.
        assert_eq!(index.file_count(), 3);
        index.apply_removal(pending);
        assert_eq!(index.file_count(), 2);
    }

    #[test]
    fn test_move_directory_relocates_children() {
        let (_model, index) = built_index();
        let pending = index.prepare_removal(&StorageEvent::Moved {
            from: "src/a".into(),
            to: "src/c".into(),
        });
        assert_eq!(pending.removed.len(), 2);

        let relocated = index.apply_removal(pending);
        assert_eq!(
            relocated,
            vec![PathBuf::from("src/c/X.java"), PathBuf::from("src/c/Y.java")]
        );
        assert_eq!(index.indexed_paths(), vec![PathBuf::from("src/b/Z.java")]);
    }

    #[test]
    fn test_rename_file() {
        let (_model, index) = built_index();
        let pending = index.prepare_removal(&StorageEvent::Moved {
            from: "src/b/Z.java".into(),
            to: "src/b/Zed.java".into(),
        });
        assert_eq!(pending.relocated, vec![PathBuf::from("src/b/Zed.java")]);
    }

    #[test]
    fn test_sibling_prefix_is_not_matched() {
        let (_model, index) = built_index();
        // `src/b/Z` is a string prefix of `src/b/Z.java` but not a path prefix.
        let pending = index.prepare_removal(&StorageEvent::Deleted("src/b/Z".into()));
        assert!(pending.is_empty());
    }
}
