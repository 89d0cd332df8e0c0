//! Regeneration pipeline.
//!
//! Scope changes are debounced, then every registered [`HandlerFactory`]
//! discovers the declarations it cares about and the resulting handlers run
//! one after another inside a single transaction:
//!
//! ```text
//! Idle -> Triggered -> Discovering -> Executing -> Idle
//!          (debounce)   (factories,    (handlers, sequential,
//!                        concurrent)    checkpoint every N)
//! ```

mod cycle;
mod error;
mod generator;
mod handler;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use cycle::{CycleHandle, CycleReport};
pub use error::{DiscoveryError, HandlerError};
pub use generator::{ArtifactGenerator, GeneratorFactory};
pub use handler::{Handler, HandlerFactory};

use crate::source::SourceModel;
use crate::transaction::TransactionCoordinator;
use crate::types::{FactoryKind, Scope};
use crate::watcher::DebounceBuffer;
use cycle::{CycleContext, run_cycle};

/// Tuning for the regeneration pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenConfig {
    /// Quiet period before triggered scopes are processed.
    pub quiet: Duration,
    /// Handlers executed between two checkpoints.
    pub bulk_update_limit: usize,
    /// Factories allowed to discover at the same time.
    pub discovery_threads: usize,
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(2000),
            bulk_update_limit: 100,
            discovery_threads: num_cpus::get(),
        }
    }
}

struct PipelineCore {
    source: Arc<dyn SourceModel>,
    coordinator: TransactionCoordinator,
    factories: RwLock<IndexMap<FactoryKind, Arc<dyn HandlerFactory>>>,
    config: RegenConfig,
    shutdown: CancellationToken,
    reports: broadcast::Sender<CycleReport>,
}

impl PipelineCore {
    fn regenerate(&self, scope: Scope) -> CycleHandle {
        let cancel = self.shutdown.child_token();
        let ctx = CycleContext {
            source: Arc::clone(&self.source),
            coordinator: self.coordinator.clone(),
            factories: self.factories.read().values().cloned().collect(),
            bulk_update_limit: self.config.bulk_update_limit,
            discovery_threads: self.config.discovery_threads,
        };
        let reports = self.reports.clone();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let report = run_cycle(ctx, scope, task_cancel).await;
            // No subscribers is fine.
            let _ = reports.send(report.clone());
            report
        });
        CycleHandle::new(cancel, handle)
    }
}

/// Drives registered handler factories whenever a scope is triggered.
pub struct RegenerationPipeline {
    core: Arc<PipelineCore>,
    buffer: DebounceBuffer<Scope>,
}

impl RegenerationPipeline {
    /// Create the pipeline and spawn its debounce worker on the current
    /// tokio runtime.
    pub fn new(
        source: Arc<dyn SourceModel>,
        coordinator: TransactionCoordinator,
        config: RegenConfig,
    ) -> Self {
        let (reports, _) = broadcast::channel(64);
        let quiet = config.quiet;
        let core = Arc::new(PipelineCore {
            source,
            coordinator,
            factories: RwLock::new(IndexMap::new()),
            config,
            shutdown: CancellationToken::new(),
            reports,
        });

        let flush_core = Arc::clone(&core);
        let buffer = DebounceBuffer::spawn("regen", quiet, move |batch: HashSet<Scope>| {
            let core = Arc::clone(&flush_core);
            async move {
                let Some(scope) = batch.into_iter().reduce(Scope::union) else {
                    return;
                };
                if core.shutdown.is_cancelled() {
                    crate::debug_event!("regen", "skipped", "pipeline closed, dropping {scope}");
                    return;
                }
                // Awaiting keeps triggered cycles strictly sequential.
                core.regenerate(scope).await;
            }
        });

        Self { core, buffer }
    }

    /// Queue a scope for regeneration. Returns immediately; scopes
    /// triggered within one quiet period are merged into a single cycle.
    pub fn trigger(&self, scope: Scope) {
        if scope.is_empty() {
            return;
        }
        self.buffer.submit(scope);
    }

    /// Run one cycle for `scope` right away, bypassing the debounce buffer.
    pub fn regenerate(&self, scope: Scope) -> CycleHandle {
        self.core.regenerate(scope)
    }

    /// Register a factory. A factory of the same kind is replaced and
    /// returned; the new one keeps the old registration slot.
    pub fn add_handler_factory(
        &self,
        factory: Arc<dyn HandlerFactory>,
    ) -> Option<Arc<dyn HandlerFactory>> {
        let kind = factory.kind();
        let previous = self.core.factories.write().insert(kind.clone(), factory);
        if previous.is_some() {
            crate::log_event!("regen", "factory replaced", "{kind}");
        } else {
            crate::debug_event!("regen", "factory added", "{kind}");
        }
        previous
    }

    pub fn remove_handler_factory(&self, kind: &FactoryKind) -> bool {
        self.core.factories.write().shift_remove(kind).is_some()
    }

    pub fn factory_kinds(&self) -> Vec<FactoryKind> {
        self.core.factories.read().keys().cloned().collect()
    }

    pub fn config(&self) -> &RegenConfig {
        &self.core.config
    }

    /// Receive the report of every cycle finished from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.core.reports.subscribe()
    }

    /// Cancel running cycles, drop pending triggers and stop the worker.
    pub async fn close(&self) {
        self.core.shutdown.cancel();
        self.buffer.close().await;
        crate::debug_event!("regen", "closed");
    }
}

impl Drop for RegenerationPipeline {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}
