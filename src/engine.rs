//! One workspace session: a marker index and a regeneration pipeline wired
//! to the same source model.
//!
//! ```text
//! change notification ──> trigger_reindex ──> IndexUpdater ──> MarkerIndex
//!                    └──> trigger_regeneration ──> RegenerationPipeline ──> Storage
//! ```
//!
//! Every `trigger_*` call returns immediately; the work happens on the
//! runtime once edits go quiet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::index::{
    BuildStatus, DuplicateGroups, IndexUpdater, MarkerIndex, PendingRemoval, ReindexBatch,
    StorageEvent,
};
use crate::regen::{CycleHandle, HandlerFactory, RegenerationPipeline};
use crate::source::SourceModel;
use crate::storage::Storage;
use crate::transaction::TransactionCoordinator;
use crate::types::{FactoryKind, Scope, normalize_path};

pub struct Engine {
    settings: Settings,
    index: Arc<MarkerIndex>,
    updater: IndexUpdater,
    pipeline: RegenerationPipeline,
    coordinator: TransactionCoordinator,
    cancel: CancellationToken,
}

impl Engine {
    /// Wire up a session. Must be called from within a tokio runtime.
    pub fn new(settings: Settings, source: Arc<dyn SourceModel>, storage: Arc<dyn Storage>) -> Self {
        let index = Arc::new(MarkerIndex::new(
            Arc::clone(&source),
            settings.index.marker_kind.clone(),
            settings.index.ignore_policy(),
        ));
        let updater = IndexUpdater::spawn(Arc::clone(&index), settings.debounce.index_quiet());
        let coordinator = TransactionCoordinator::new(storage);
        let pipeline =
            RegenerationPipeline::new(source, coordinator.clone(), settings.regen_config());

        crate::debug_event!(
            "engine",
            "created",
            "marker kind {}, {} ignored suffixes",
            settings.index.marker_kind,
            settings.index.ignored_value_suffixes.len()
        );

        Self {
            settings,
            index,
            updater,
            pipeline,
            coordinator,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<MarkerIndex> {
        &self.index
    }

    pub fn pipeline(&self) -> &RegenerationPipeline {
        &self.pipeline
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Run the initial full scan on a blocking worker.
    pub async fn build_index(&self, scope: Scope) -> BuildStatus {
        let index = Arc::clone(&self.index);
        let cancel = self.cancel.clone();
        match tokio::task::spawn_blocking(move || index.build(&scope, &cancel)).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("[engine] index build worker failed: {e}");
                BuildStatus::Failed
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_ready()
    }

    /// A file's content changed. Debounced.
    pub fn trigger_reindex(&self, file: impl AsRef<Path>) {
        self.updater.submit(file);
    }

    /// Paths were deleted. Their index entries (and those of every indexed
    /// file below them) are captured now and dropped with the next re-index
    /// batch.
    pub fn trigger_removal<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let pending = self.prepare_removal(&StorageEvent::Deleted(path.as_ref().to_path_buf()));
            self.apply_removal(pending);
        }
    }

    /// First phase of a removal or move: capture the affected index keys
    /// while they still describe the old layout.
    pub fn prepare_removal(&self, event: &StorageEvent) -> PendingRemoval {
        self.index.prepare_removal(event)
    }

    /// Second phase, called once the storage change landed: queue the
    /// prepared removal. The debounced re-index drops the old entries before
    /// re-scanning anything that moved; moved files are also regenerated.
    pub fn apply_removal(&self, pending: PendingRemoval) {
        if pending.is_empty() {
            return;
        }
        if !pending.relocated.is_empty() {
            self.pipeline.trigger(Scope::files(pending.relocated.iter().cloned()));
        }
        self.updater.submit_removal(pending);
    }

    /// Debounced regeneration of `scope`.
    pub fn trigger_regeneration(&self, scope: Scope) {
        self.pipeline.trigger(scope);
    }

    /// Regenerate `scope` now, bypassing the debounce buffer.
    pub fn regenerate(&self, scope: Scope) -> CycleHandle {
        self.pipeline.regenerate(scope)
    }

    pub fn types_with_marker(&self, value: &str) -> std::collections::BTreeSet<String> {
        self.index.types_with_marker(value)
    }

    pub fn duplicates(&self) -> DuplicateGroups {
        self.index.duplicates()
    }

    pub fn duplicates_in(&self, path: impl AsRef<Path>) -> DuplicateGroups {
        self.index.duplicates_in(&normalize_path(path.as_ref()))
    }

    pub fn add_handler_factory(
        &self,
        factory: Arc<dyn HandlerFactory>,
    ) -> Option<Arc<dyn HandlerFactory>> {
        self.pipeline.add_handler_factory(factory)
    }

    pub fn remove_handler_factory(&self, kind: &FactoryKind) -> bool {
        self.pipeline.remove_handler_factory(kind)
    }

    /// Observe every processed re-index batch.
    pub fn on_index_flush(&self, listener: impl Fn(&ReindexBatch) + Send + Sync + 'static) {
        self.updater.on_flush(listener);
    }

    /// Files currently present in the index.
    pub fn indexed_paths(&self) -> Vec<PathBuf> {
        self.index.indexed_paths()
    }

    /// Cancel in-flight work, drain both buffers and clear the index.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        self.pipeline.close().await;
        self.updater.close().await;
        self.index.clear();
        crate::log_event!("engine", "disposed");
    }
}
