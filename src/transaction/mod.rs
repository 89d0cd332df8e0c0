//! Transactional multi-file write coordination.
//!
//! A [`Transaction`] collects the [`WriteIntent`]s of one logical unit of
//! work and commits them together through [`commit_all`]. It does not make
//! the set atomic: the commit gate keeps a permissions problem from
//! producing a half-written set, but a member that fails after the gate
//! leaves the other members written.
//!
//! ```text
//! run_in_transaction ─┬─ register(intent) ... register(intent)
//!                     ├─ checkpoint()   commit queued intents, stay open
//!                     ├─ register(intent) ...
//!                     └─ finish(save)   await checkpoints, final commit, close
//! ```
//!
//! The transaction is bound to the running task with a task-local, so code
//! deep inside a unit of work reaches it with [`Transaction::current`].
//! Sub-tasks receive it explicitly through [`Transaction::enter`].

mod commit;
mod error;
mod intent;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::storage::Storage;
use crate::types::normalize_path;

pub use commit::{CommitOutcome, commit_all};
pub use error::{TransactionError, TransactionResult};
pub use intent::WriteIntent;

tokio::task_local! {
    static CURRENT: Transaction;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Closed,
}

struct Registry {
    state: TransactionState,
    intents: IndexMap<PathBuf, WriteIntent>,
    /// Tail of the chain of in-flight checkpoint commits.
    pending: Option<JoinHandle<CommitOutcome>>,
    checkpoints: usize,
}

struct TransactionInner {
    id: u64,
    storage: Arc<dyn Storage>,
    commit_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
    registry: Mutex<Registry>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        if registry.state == TransactionState::Open && !registry.intents.is_empty() {
            tracing::warn!(
                "[tx] transaction {} dropped without finish, {} intents lost",
                self.id,
                registry.intents.len()
            );
        }
    }
}

/// Open collection of write intents for one unit of work.
///
/// Cloning yields another handle to the same transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    /// The transaction bound to the calling task.
    ///
    /// Fails with [`TransactionError::NoTransaction`] outside
    /// [`TransactionCoordinator::run_in_transaction`] / [`Transaction::enter`].
    pub fn current() -> TransactionResult<Transaction> {
        CURRENT
            .try_with(Clone::clone)
            .map_err(|_| TransactionError::NoTransaction)
    }

    /// Run `work` with this transaction as the current one.
    pub async fn enter<F: Future>(&self, work: F) -> F::Output {
        CURRENT.scope(self.clone(), work).await
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> TransactionState {
        self.inner.registry.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == TransactionState::Open
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Number of intents waiting for the next commit.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.lock().intents.len()
    }

    pub fn checkpoints(&self) -> usize {
        self.inner.registry.lock().checkpoints
    }

    /// Insert `intent`, replacing any intent already registered for the
    /// same (normalized) path.
    pub fn register(&self, intent: WriteIntent) -> TransactionResult<()> {
        let mut registry = self.inner.registry.lock();
        if registry.state == TransactionState::Closed {
            return Err(TransactionError::Closed { id: self.inner.id });
        }
        let key = normalize_path(intent.target());
        if registry.intents.insert(key.clone(), intent).is_some() {
            crate::debug_event!("tx", "replaced", "{}", key.display());
        }
        Ok(())
    }

    /// Commit every registered intent and clear the registry, leaving the
    /// transaction open.
    ///
    /// The commit runs in the background, chained behind earlier
    /// checkpoints so writes land in registration order. `finish` awaits
    /// the chain.
    pub fn checkpoint(&self) -> TransactionResult<()> {
        let mut registry = self.inner.registry.lock();
        if registry.state == TransactionState::Closed {
            return Err(TransactionError::Closed { id: self.inner.id });
        }
        if registry.intents.is_empty() {
            return Ok(());
        }

        let intents: Vec<WriteIntent> = registry.intents.drain(..).map(|(_, i)| i).collect();
        registry.checkpoints += 1;
        crate::debug_event!(
            "tx",
            "checkpoint",
            "#{} of transaction {} ({} intents)",
            registry.checkpoints,
            self.inner.id,
            intents.len()
        );

        let previous = registry.pending.take();
        let storage = Arc::clone(&self.inner.storage);
        let commit_lock = Arc::clone(&self.inner.commit_lock);
        // Once queued, a checkpoint commit runs to completion even if the
        // transaction is cancelled afterwards.
        registry.pending = Some(tokio::spawn(async move {
            let mut outcome = match previous {
                Some(previous) => join_commit(previous).await,
                None => CommitOutcome::default(),
            };
            let _guard = commit_lock.lock().await;
            outcome.merge(commit_all(storage.as_ref(), intents).await);
            outcome
        }));
        Ok(())
    }

    /// Terminal commit: await in-flight checkpoints, then commit what is
    /// still registered and close.
    ///
    /// When `should_save` is false or the transaction was cancelled the
    /// registered intents are discarded without any write. Not cancellable
    /// once started.
    pub async fn finish(&self, should_save: bool) -> TransactionResult<CommitOutcome> {
        let (intents, pending) = {
            let mut registry = self.inner.registry.lock();
            if registry.state == TransactionState::Closed {
                return Err(TransactionError::Closed { id: self.inner.id });
            }
            registry.state = TransactionState::Closed;
            let intents: Vec<WriteIntent> = registry.intents.drain(..).map(|(_, i)| i).collect();
            (intents, registry.pending.take())
        };

        let mut outcome = match pending {
            Some(pending) => join_commit(pending).await,
            None => CommitOutcome::default(),
        };

        if !should_save || self.is_cancelled() {
            if !intents.is_empty() {
                crate::debug_event!(
                    "tx",
                    "discarded",
                    "{} intents of transaction {}",
                    intents.len(),
                    self.inner.id
                );
            }
            outcome.discarded += intents.len();
            return Ok(outcome);
        }

        let _guard = self.inner.commit_lock.lock().await;
        outcome.merge(commit_all(self.inner.storage.as_ref(), intents).await);
        crate::debug_event!(
            "tx",
            "finished",
            "transaction {} ({} written, success={})",
            self.inner.id,
            outcome.written.len(),
            outcome.success()
        );
        Ok(outcome)
    }
}

async fn join_commit(handle: JoinHandle<CommitOutcome>) -> CommitOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("[tx] checkpoint commit task failed: {e}");
            CommitOutcome {
                aborted_tasks: 1,
                ..CommitOutcome::default()
            }
        }
    }
}

/// Creates transactions and serializes their commits against one storage.
#[derive(Clone)]
pub struct TransactionCoordinator {
    storage: Arc<dyn Storage>,
    commit_lock: Arc<tokio::sync::Mutex<()>>,
    next_id: Arc<AtomicU64>,
}

impl TransactionCoordinator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            commit_lock: Arc::new(tokio::sync::Mutex::new(())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Open a transaction without binding it to the current task.
    pub fn begin(&self, cancel: CancellationToken) -> Transaction {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        crate::debug_event!("tx", "begin", "transaction {id}");
        Transaction {
            inner: Arc::new(TransactionInner {
                id,
                storage: Arc::clone(&self.storage),
                commit_lock: Arc::clone(&self.commit_lock),
                cancel,
                registry: Mutex::new(Registry {
                    state: TransactionState::Open,
                    intents: IndexMap::new(),
                    pending: None,
                    checkpoints: 0,
                }),
            }),
        }
    }

    /// Run `work` inside a transaction and finish it afterwards.
    ///
    /// The transaction is saved unless `cancel` fired. When the calling task
    /// already runs inside a transaction, `work` joins it and the outer owner
    /// remains responsible for finishing; the returned outcome is then empty.
    pub async fn run_in_transaction<F, Fut, T>(
        &self,
        cancel: CancellationToken,
        work: F,
    ) -> (T, CommitOutcome)
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = T>,
    {
        if let Ok(current) = Transaction::current() {
            crate::debug_event!("tx", "nested", "joining transaction {}", current.id());
            return (work(current).await, CommitOutcome::default());
        }

        let tx = self.begin(cancel.clone());
        let value = tx.enter(work(tx.clone())).await;
        let outcome = match tx.finish(!cancel.is_cancelled()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // `work` closed the transaction itself.
                crate::debug_event!("tx", "already finished", "{e}");
                CommitOutcome::default()
            }
        };
        (value, outcome)
    }
}
