//! One regeneration cycle: discover, then execute inside a transaction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::{Handler, HandlerFactory};
use crate::source::SourceModel;
use crate::transaction::{CommitOutcome, Transaction, TransactionCoordinator};
use crate::types::Scope;

/// What a cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scope: String,
    /// Handlers discovered across all factories.
    pub handlers: usize,
    /// Handlers that ran to completion, successfully or not.
    pub executed: usize,
    pub failed_handlers: usize,
    pub failed_factories: usize,
    /// Intermediate commits performed while executing.
    pub checkpoints: usize,
    pub transaction_opened: bool,
    /// A shared-context failure abandoned the remaining handlers.
    pub fatal: bool,
    pub cancelled: bool,
    pub commit: CommitOutcome,
}

impl CycleReport {
    pub fn success(&self) -> bool {
        !self.fatal
            && !self.cancelled
            && self.failed_handlers == 0
            && self.failed_factories == 0
            && self.commit.success()
    }
}

/// Handle to a running cycle. Await it for the report.
///
/// Resolves to `None` if the cycle task itself panicked.
pub struct CycleHandle {
    cancel: CancellationToken,
    handle: JoinHandle<CycleReport>,
}

impl CycleHandle {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<CycleReport>) -> Self {
        Self { cancel, handle }
    }

    /// Request cooperative cancellation. Handlers already done stay
    /// committed; the final commit is skipped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Option<CycleReport> {
        self.await
    }
}

impl Future for CycleHandle {
    type Output = Option<CycleReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("[regen] cycle task failed: {e}");
                None
            }
        })
    }
}

/// Inputs a cycle needs, snapshotted when it starts.
pub(crate) struct CycleContext {
    pub source: Arc<dyn SourceModel>,
    pub coordinator: TransactionCoordinator,
    pub factories: Vec<Arc<dyn HandlerFactory>>,
    pub bulk_update_limit: usize,
    pub discovery_threads: usize,
}

pub(crate) async fn run_cycle(
    ctx: CycleContext,
    scope: Scope,
    cancel: CancellationToken,
) -> CycleReport {
    let mut report = CycleReport {
        scope: scope.to_string(),
        ..CycleReport::default()
    };

    let handlers = discover(&ctx, &scope, &cancel, &mut report).await;
    report.handlers = handlers.len();

    if cancel.is_cancelled() {
        report.cancelled = true;
        crate::log_event!("regen", "cancelled", "during discovery of {scope}");
        return report;
    }
    if handlers.is_empty() {
        crate::debug_event!("regen", "idle", "nothing to regenerate in {scope}");
        return report;
    }

    crate::log_event!("regen", "executing", "{} handlers for {scope}", handlers.len());
    report.transaction_opened = true;

    let limit = ctx.bulk_update_limit.max(1);
    let run_cancel = cancel.clone();
    let (stats, commit) = ctx
        .coordinator
        .run_in_transaction(cancel.clone(), |tx| execute(tx, handlers, limit, run_cancel))
        .await;

    report.executed = stats.executed;
    report.failed_handlers = stats.failed;
    report.checkpoints = stats.checkpoints;
    report.fatal = stats.fatal;
    report.cancelled = cancel.is_cancelled();
    report.commit = commit;

    if report.success() {
        crate::log_event!(
            "regen",
            "done",
            "{} artifacts written for {scope}",
            report.commit.written.len()
        );
    } else {
        tracing::warn!(
            "[regen] cycle for {scope} finished with problems: {} handler failures, {} factory failures, {} write failures, fatal={}, cancelled={}",
            report.failed_handlers,
            report.failed_factories,
            report.commit.failed.len() + report.commit.rejected.len(),
            report.fatal,
            report.cancelled
        );
    }
    report
}

/// Run every factory, concurrently up to `discovery_threads`, and flatten
/// the handlers in factory registration order.
async fn discover(
    ctx: &CycleContext,
    scope: &Scope,
    cancel: &CancellationToken,
    report: &mut CycleReport,
) -> Vec<Arc<dyn Handler>> {
    let semaphore = Arc::new(Semaphore::new(ctx.discovery_threads.max(1)));
    let mut tasks = JoinSet::new();

    for (order, factory) in ctx.factories.iter().enumerate() {
        let factory = Arc::clone(factory);
        let semaphore = Arc::clone(&semaphore);
        let source = Arc::clone(&ctx.source);
        let scope = scope.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let kind = factory.kind();
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (order, kind, Ok(Vec::new()));
            };
            if cancel.is_cancelled() {
                return (order, kind, Ok(Vec::new()));
            }
            let result = factory.discover(&scope, source).await;
            (order, kind, result)
        });
    }

    let mut discovered: Vec<(usize, Vec<Arc<dyn Handler>>)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((order, kind, Ok(handlers))) => {
                crate::debug_event!("regen", "discovered", "{kind}: {} handlers", handlers.len());
                discovered.push((order, handlers));
            }
            Ok((_, kind, Err(e))) => {
                tracing::warn!("[regen] discovery failed for {kind}: {e}");
                report.failed_factories += 1;
            }
            Err(e) => {
                tracing::error!("[regen] discovery task failed: {e}");
                report.failed_factories += 1;
            }
        }
    }

    discovered.sort_by_key(|(order, _)| *order);
    discovered
        .into_iter()
        .flat_map(|(_, handlers)| handlers)
        .collect()
}

#[derive(Debug, Default)]
struct ExecutionStats {
    executed: usize,
    failed: usize,
    checkpoints: usize,
    fatal: bool,
}

/// Run handlers one after another against the shared transaction.
async fn execute(
    tx: Transaction,
    handlers: Vec<Arc<dyn Handler>>,
    limit: usize,
    cancel: CancellationToken,
) -> ExecutionStats {
    let mut stats = ExecutionStats::default();
    let total = handlers.len();

    for (i, handler) in handlers.into_iter().enumerate() {
        if cancel.is_cancelled() {
            crate::log_event!("regen", "cancelled", "{} of {total} handlers left", total - i);
            break;
        }

        let declaration = handler.declaration().clone();
        // Each handler runs as its own task so a panic is contained. The
        // task still sees the cycle's transaction as current.
        let scoped = tx.clone();
        let joined = tokio::spawn(async move { scoped.enter(handler.run()).await }).await;

        match joined {
            Ok(Ok(intents)) => {
                for intent in intents {
                    if let Err(e) = tx.register(intent) {
                        tracing::error!("[regen] cannot register write for {declaration}: {e}");
                    }
                }
            }
            Ok(Err(e)) if e.is_fatal() => {
                // Remaining handlers are abandoned; what earlier handlers
                // registered is still committed by `finish`.
                tracing::error!("[regen] aborting cycle at {declaration}: {e}");
                stats.fatal = true;
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!("[regen] {e}");
                stats.failed += 1;
            }
            Err(e) => {
                tracing::error!("[regen] handler for {declaration} panicked: {e}");
                stats.failed += 1;
            }
        }
        stats.executed += 1;

        let done = i + 1;
        if done % limit == 0 && done < total {
            match tx.checkpoint() {
                Ok(()) => stats.checkpoints += 1,
                Err(e) => tracing::error!("[regen] checkpoint failed: {e}"),
            }
        }
    }

    stats
}
