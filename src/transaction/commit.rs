//! Commit protocol for a set of write intents.
//!
//! 1. Resolve the on-disk target of every intent.
//! 2. Gate: if any target is not writable, write nothing.
//! 3. Commit each intent on its own; a failing member is logged and the
//!    remaining members are still committed.
//!
//! There is no rollback. A failed member marks the whole commit
//! unsuccessful while the other members' writes stay in place.

use std::path::PathBuf;

use super::WriteIntent;
use crate::storage::Storage;

/// Accumulated result of one or more commit attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Targets written successfully.
    pub written: Vec<PathBuf>,
    /// Targets whose production or write failed.
    pub failed: Vec<PathBuf>,
    /// Non-writable targets that made the gate abort a commit.
    pub rejected: Vec<PathBuf>,
    /// Intents dropped without a write attempt (cancelled or not saved).
    pub discarded: usize,
    /// Commit tasks that ended abnormally.
    pub aborted_tasks: usize,
}

impl CommitOutcome {
    /// Logical AND over every member commit.
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty() && self.aborted_tasks == 0
    }

    pub fn merge(&mut self, other: CommitOutcome) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
        self.rejected.extend(other.rejected);
        self.discarded += other.discarded;
        self.aborted_tasks += other.aborted_tasks;
    }
}

/// Commit `intents` against `storage` following the gate-then-members
/// protocol.
pub async fn commit_all(storage: &dyn Storage, intents: Vec<WriteIntent>) -> CommitOutcome {
    let mut outcome = CommitOutcome::default();
    if intents.is_empty() {
        return outcome;
    }

    // Intents hold `Send`-only producers, so nothing borrows them across the
    // gate's awaits.
    let targets: Vec<PathBuf> = intents
        .iter()
        .map(|intent| storage.resolve(intent.target()))
        .collect();

    for path in targets.iter().cloned() {
        if !storage.is_writable(&path).await {
            outcome.rejected.push(path);
        }
    }
    if !outcome.rejected.is_empty() {
        tracing::error!(
            "[tx] commit aborted, {} of {} targets not writable: {}",
            outcome.rejected.len(),
            targets.len(),
            outcome.rejected[0].display()
        );
        return outcome;
    }

    for (path, intent) in targets.into_iter().zip(intents) {
        match intent.commit(&path, storage).await {
            Ok(()) => outcome.written.push(path),
            Err(e) => {
                tracing::error!("[tx] {e}");
                outcome.failed.push(path);
            }
        }
    }

    crate::debug_event!(
        "tx",
        "committed",
        "{} written, {} failed",
        outcome.written.len(),
        outcome.failed.len()
    );
    outcome
}
