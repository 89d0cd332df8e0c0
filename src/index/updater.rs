//! Debounced per-file re-indexing.
//!
//! Changes are never applied on the notifying thread. Content changes and
//! prepared removals are submitted to a [`DebounceBuffer`]; once edits go
//! quiet a blocking worker first applies the removals, then re-scans the
//! batch with one `update_file` per affected file, grouped by owning module.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::{FileUpdate, MarkerIndex, PendingRemoval};
use crate::types::normalize_path;
use crate::watcher::DebounceBuffer;

/// One item of a re-index batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexChange {
    /// A file's content changed.
    Changed(PathBuf),
    /// A removal prepared against the pre-change layout.
    Removed(PendingRemoval),
}

/// What one flushed re-index batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexBatch {
    /// Entries dropped by removals.
    pub removed: Vec<PathBuf>,
    /// Files whose record was replaced.
    pub updated: Vec<PathBuf>,
    /// Files that no longer carry markers.
    pub cleared: Vec<PathBuf>,
    /// Files whose re-scan failed; their prior record is kept.
    pub failed: Vec<PathBuf>,
}

impl ReindexBatch {
    /// Every path the batch touched, in processing order.
    pub fn touched(&self) -> impl Iterator<Item = &PathBuf> {
        self.updated.iter().chain(&self.cleared)
    }
}

type FlushListener = Arc<dyn Fn(&ReindexBatch) + Send + Sync>;

/// Feeds file-change notifications into a [`MarkerIndex`] via debouncing.
pub struct IndexUpdater {
    buffer: DebounceBuffer<IndexChange>,
    listeners: Arc<RwLock<Vec<FlushListener>>>,
}

impl IndexUpdater {
    /// Spawn the updater on the current tokio runtime.
    pub fn spawn(index: Arc<MarkerIndex>, quiet: Duration) -> Self {
        let listeners: Arc<RwLock<Vec<FlushListener>>> = Arc::new(RwLock::new(Vec::new()));
        let flush_listeners = Arc::clone(&listeners);

        let buffer = DebounceBuffer::spawn("updater", quiet, move |batch: HashSet<IndexChange>| {
            let index = Arc::clone(&index);
            let listeners = Arc::clone(&flush_listeners);
            async move {
                let result =
                    tokio::task::spawn_blocking(move || reindex_batch(&index, batch)).await;
                match result {
                    Ok(summary) => {
                        let listeners: Vec<FlushListener> = listeners.read().clone();
                        for listener in listeners {
                            listener(&summary);
                        }
                    }
                    Err(e) => tracing::error!("[updater] re-index worker failed: {e}"),
                }
            }
        });

        Self { buffer, listeners }
    }

    /// Queue a changed file for re-indexing. Returns immediately.
    pub fn submit(&self, path: impl AsRef<Path>) {
        self.buffer
            .submit(IndexChange::Changed(normalize_path(path.as_ref())));
    }

    /// Queue a prepared removal. Relocated paths are re-scanned after the
    /// old entries are dropped.
    pub fn submit_removal(&self, pending: PendingRemoval) {
        if !pending.is_empty() {
            self.buffer.submit(IndexChange::Removed(pending));
        }
    }

    /// Register a callback invoked after each processed batch.
    pub fn on_flush(&self, listener: impl Fn(&ReindexBatch) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Flush what is pending and stop.
    pub async fn close(&self) {
        self.buffer.close().await;
    }
}

/// Apply the batch's removals, then re-scan every file, module by module.
fn reindex_batch(index: &MarkerIndex, batch: HashSet<IndexChange>) -> ReindexBatch {
    let mut summary = ReindexBatch::default();
    let mut files: HashSet<PathBuf> = HashSet::new();
    let mut removals: Vec<PendingRemoval> = Vec::new();
    for change in batch {
        match change {
            IndexChange::Changed(path) => {
                files.insert(path);
            }
            IndexChange::Removed(pending) => removals.push(pending),
        }
    }

    for pending in removals {
        summary.removed.extend(pending.removed.iter().cloned());
        files.extend(index.apply_removal(pending));
    }
    summary.removed.sort();
    summary.removed.dedup();

    let mut groups: BTreeMap<Option<String>, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        let module = index.source().module_of(&path);
        groups.entry(module).or_default().push(path);
    }

    for (module, mut files) in groups {
        files.sort();
        crate::debug_event!(
            "updater",
            "module",
            "{} ({} files)",
            module.as_deref().unwrap_or("<root>"),
            files.len()
        );

        for file in files {
            match index.update_file(&file) {
                Ok(FileUpdate::Replaced { .. }) => summary.updated.push(file),
                Ok(FileUpdate::Removed) => summary.cleared.push(file),
                Err(e) => {
                    tracing::warn!("[updater] {e}");
                    summary.failed.push(file);
                }
            }
        }
    }

    crate::log_event!(
        "updater",
        "re-indexed",
        "{} removed, {} updated, {} cleared, {} failed",
        summary.removed.len(),
        summary.updated.len(),
        summary.cleared.len(),
        summary.failed.len()
    );
    summary
}
