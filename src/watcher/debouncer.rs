//! Shared debouncing logic for change notifications.
//!
//! Debouncing turns a burst of notifications (every keystroke, auto-save,
//! IDE formatting) into one batch that is handed to a consumer once the
//! stream has been quiet for a fixed duration.
//!
//! ```text
//! submit(A) submit(B) submit(A)      quiet period       flush({A, B})
//!    |---------|---------|------------------------------->|
//! ```
//!
//! A single worker task owns the batch, so flushes never overlap. Items
//! submitted while a flush is running are queued and land in the next batch.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Coalesces submitted items into batches delivered after a quiet period.
pub struct DebounceBuffer<T> {
    name: &'static str,
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> DebounceBuffer<T>
where
    T: Eq + Hash + Debug + Send + 'static,
{
    /// Spawn the flush worker on the current tokio runtime.
    ///
    /// `on_flush` receives each batch. It runs as its own task: a panic in
    /// it is logged and the worker keeps serving later batches.
    pub fn spawn<F, Fut>(name: &'static str, quiet: Duration, on_flush: F) -> Self
    where
        F: Fn(HashSet<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(name, quiet, rx, on_flush));
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Add an item to the current batch and restart the quiet timer.
    ///
    /// Never blocks. Items submitted after [`close`](Self::close) are dropped
    /// with a debug log.
    pub fn submit(&self, item: T) {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(item) {
                    crate::debug_event!(self.name, "dropped", "{:?}", e.0);
                }
            }
            None => crate::debug_event!(self.name, "closed", "{item:?}"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Stop accepting items, flush whatever is pending, and wait for the
    /// worker to finish.
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("[{}] worker ended abnormally: {e}", self.name);
            }
        }
    }
}

impl<T> Drop for DebounceBuffer<T> {
    fn drop(&mut self) {
        // Closing the channel lets the worker flush and exit on its own.
        self.tx.get_mut().take();
    }
}

async fn run_worker<T, F, Fut>(
    name: &'static str,
    quiet: Duration,
    mut rx: mpsc::UnboundedReceiver<T>,
    on_flush: F,
) where
    T: Eq + Hash + Debug + Send + 'static,
    F: Fn(HashSet<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut batch: HashSet<T> = HashSet::new();

    loop {
        // Idle until the first item of a new batch arrives.
        let Some(first) = rx.recv().await else {
            break;
        };
        batch.insert(first);

        let mut open = true;
        while open {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => {
                        batch.insert(item);
                    }
                    None => open = false,
                },
                _ = tokio::time::sleep(quiet) => break,
            }
        }

        let taken = std::mem::take(&mut batch);
        crate::debug_event!(name, "flush", "{} items", taken.len());

        if let Err(e) = tokio::spawn(on_flush(taken)).await {
            tracing::error!("[{name}] flush failed: {e}");
        }

        if !open {
            break;
        }
    }

    crate::debug_event!(name, "stopped");
}
