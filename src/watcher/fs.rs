//! File-system watcher feeding an [`Engine`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{WatchError, WatchResult};
use crate::engine::Engine;
use crate::index::StorageEvent;
use crate::types::{Scope, normalize_path};

/// What one notify event means for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Content appeared or changed at this path (file or directory).
    Changed(PathBuf),
    /// Something disappeared or moved away.
    Removed(StorageEvent),
}

/// Translate a raw notify event. `exists` resolves ambiguous renames
/// reported with a single path.
pub fn translate(event: &Event, exists: impl Fn(&Path) -> bool) -> Vec<WatchAction> {
    let paths = event.paths.iter().map(|p| normalize_path(p));

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            paths.map(WatchAction::Changed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![WatchAction::Removed(StorageEvent::Moved {
                from: normalize_path(&event.paths[0]),
                to: normalize_path(&event.paths[1]),
            })]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => paths
            .map(|p| WatchAction::Removed(StorageEvent::Deleted(p)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(WatchAction::Changed).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .map(|p| {
                if exists(&p) {
                    WatchAction::Changed(p)
                } else {
                    WatchAction::Removed(StorageEvent::Deleted(p))
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Watches a workspace root recursively and routes changes to an engine.
///
/// Content changes are re-indexed and regenerated through the engine's
/// debounce buffers; removals and moves go through two-phase removal so the
/// index is pruned using its pre-change keys.
pub struct FsWatcher {
    engine: Arc<Engine>,
    root: PathBuf,
    extensions: Vec<String>,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    _watcher: notify::RecommendedWatcher,
}

impl FsWatcher {
    pub fn new(engine: Arc<Engine>, root: impl Into<PathBuf>) -> WatchResult<Self> {
        let root = normalize_path(&root.into());
        let extensions = engine.settings().index.extensions.clone();

        let (tx, rx) = mpsc::channel(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            engine,
            root,
            extensions,
            event_rx: rx,
            _watcher: watcher,
        })
    }

    /// Process events until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) -> WatchResult<()> {
        crate::log_event!("watcher", "started", "{}", self.root.display());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = self.event_rx.recv() => match res {
                    Some(Ok(event)) => self.handle_event(&event),
                    Some(Err(e)) => {
                        let e = WatchError::EventError { details: e.to_string() };
                        tracing::error!("[watcher] {e}");
                    }
                    None => return Err(WatchError::ChannelClosed),
                },
            }
        }

        crate::log_event!("watcher", "stopped");
        Ok(())
    }

    fn handle_event(&self, event: &Event) {
        for action in translate(event, Path::exists) {
            match action {
                WatchAction::Changed(path) => self.changed(&path),
                WatchAction::Removed(storage_event) => {
                    crate::debug_event!("watcher", "removed", "{storage_event:?}");
                    let pending = self.engine.prepare_removal(&storage_event);
                    self.engine.apply_removal(pending);
                    match storage_event {
                        StorageEvent::Deleted(path) => {
                            self.engine.trigger_regeneration(Scope::file(path));
                        }
                        // Files that moved in before they were ever indexed.
                        StorageEvent::Moved { to, .. } => self.changed(&to),
                    }
                }
            }
        }
    }

    fn changed(&self, path: &Path) {
        let files = if path.is_dir() {
            self.source_files_below(path)
        } else if self.is_source_file(path) {
            vec![path.to_path_buf()]
        } else {
            crate::debug_event!("watcher", "ignored", "{}", path.display());
            return;
        };
        if files.is_empty() {
            return;
        }

        crate::debug_event!("watcher", "changed", "{} ({} files)", path.display(), files.len());
        for file in &files {
            self.engine.trigger_reindex(file);
        }
        self.engine.trigger_regeneration(Scope::files(files));
    }

    fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Source files inside a directory that was created or moved in.
    fn source_files_below(&self, dir: &Path) -> Vec<PathBuf> {
        WalkBuilder::new(dir)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("[watcher] cannot walk {}: {e}", dir.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| normalize_path(entry.path()))
            .filter(|path| self.is_source_file(path))
            .collect()
    }
}
