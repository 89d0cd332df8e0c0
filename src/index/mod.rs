//! Incremental marker index with duplicate detection.
//!
//! The index answers two questions: which declarations carry marker value
//! `V`, and which marker values are used more than once.
//!
//! # Architecture
//!
//! ```text
//! MarkerIndex
//!   records: DashMap<file, MarkerRecord>   (GlobalIndex)
//!        ^                 ^
//!        | build()         | update_file() / remove_paths()
//!   full rayon scan     IndexUpdater (debounced) / two-phase removal
//! ```
//!
//! Readers (`types_with_marker`, `duplicates`) run concurrently with one
//! writer. Updates to the same file are serialized through a per-file lock so
//! a stale scan can never overwrite a newer one.

mod error;
mod ignore;
mod record;
mod removal;
mod updater;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::source::SourceModel;
use crate::types::{MarkerValue, Scope, normalize_path};

pub use error::{IndexError, IndexResult};
pub use ignore::IgnorePolicy;
pub use record::MarkerRecord;
pub use removal::{PendingRemoval, StorageEvent};
pub use updater::{IndexChange, IndexUpdater, ReindexBatch};

/// Marker value → qualified names sharing it.
pub type DuplicateGroups = BTreeMap<MarkerValue, BTreeSet<String>>;

/// Outcome of [`MarkerIndex::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// This call performed the scan.
    Built { files: usize, markers: usize },
    /// Another caller already completed the build.
    AlreadyBuilt,
    /// The scan could not complete; the index stays not-ready.
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, BuildStatus::Built { .. } | BuildStatus::AlreadyBuilt)
    }
}

/// Result of re-scanning one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileUpdate {
    /// The file's record was replaced.
    Replaced { markers: usize },
    /// The file no longer carries markers; its entry is gone.
    Removed,
}

/// Reverse index from marker value to the declarations carrying it.
pub struct MarkerIndex {
    source: Arc<dyn SourceModel>,
    marker_kind: String,
    policy: IgnorePolicy,
    records: DashMap<PathBuf, MarkerRecord>,
    /// Per-file update locks. An entry only lives while someone holds it.
    file_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    build_lock: Mutex<()>,
    /// Files written by `update_file`/`remove_file` while a build is running.
    /// The build must not install its older snapshot over them.
    touched_during_build: Mutex<Option<HashSet<PathBuf>>>,
    ready: AtomicBool,
}

impl MarkerIndex {
    pub fn new(
        source: Arc<dyn SourceModel>,
        marker_kind: impl Into<String>,
        policy: IgnorePolicy,
    ) -> Self {
        Self {
            source,
            marker_kind: marker_kind.into(),
            policy,
            records: DashMap::new(),
            file_locks: DashMap::new(),
            build_lock: Mutex::new(()),
            touched_during_build: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &Arc<dyn SourceModel> {
        &self.source
    }

    pub fn marker_kind(&self) -> &str {
        &self.marker_kind
    }

    /// True once the initial build completed and the index was not torn down.
    ///
    /// Duplicate queries on a not-ready index only reflect incremental
    /// updates and must not be trusted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Full scan of every file in `scope`.
    ///
    /// Only one builder runs at a time; callers arriving while or after a
    /// build completes get [`BuildStatus::AlreadyBuilt`]. Failures are logged
    /// and leave the index not-ready.
    pub fn build(&self, scope: &Scope, cancel: &CancellationToken) -> BuildStatus {
        if self.is_ready() {
            return BuildStatus::AlreadyBuilt;
        }
        let _guard = self.build_lock.lock();
        if self.is_ready() {
            return BuildStatus::AlreadyBuilt;
        }

        *self.touched_during_build.lock() = Some(HashSet::new());
        let status = self.build_locked(scope, cancel);
        *self.touched_during_build.lock() = None;
        status
    }

    fn build_locked(&self, scope: &Scope, cancel: &CancellationToken) -> BuildStatus {
        crate::log_event!("index", "building", "{scope}");

        let files = match self.source.files(scope) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("[index] build failed: {}", IndexError::Enumerate(e));
                return BuildStatus::Failed;
            }
        };

        let scanned: Vec<IndexResult<Option<(PathBuf, MarkerRecord)>>> = files
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }
                let file = normalize_path(file);
                match self.scan_file(&file) {
                    Ok(record) if record.is_empty() => Ok(None),
                    Ok(record) => Ok(Some((file, record))),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        // Skipped files are picked up again on their next edit.
                        tracing::warn!("[index] skipping during build: {e}");
                        Ok(None)
                    }
                }
            })
            .collect();

        let mut records = Vec::with_capacity(scanned.len());
        for result in scanned {
            match result {
                Ok(Some(entry)) => records.push(entry),
                Ok(None) => {}
                Err(IndexError::Cancelled) => {
                    crate::log_event!("index", "build cancelled");
                    return BuildStatus::Cancelled;
                }
                Err(e) => {
                    tracing::error!("[index] build failed: {e}");
                    return BuildStatus::Failed;
                }
            }
        }

        let file_count = records.len();
        let markers: usize = records.iter().map(|(_, r)| r.len()).sum();
        let mut superseded = 0;
        for (file, record) in records {
            self.with_file_lock(&file.clone(), || {
                if self.was_touched_during_build(&file) {
                    superseded += 1;
                } else {
                    self.records.insert(file, record);
                }
            });
        }
        if superseded > 0 {
            crate::debug_event!("index", "build kept newer updates", "{superseded} files");
        }
        self.ready.store(true, Ordering::Release);

        crate::log_event!(
            "index",
            "built",
            "{markers} markers in {file_count} files"
        );
        BuildStatus::Built {
            files: file_count,
            markers,
        }
    }

    /// Re-scan one file and replace its record wholesale.
    ///
    /// On failure the previous record is left untouched.
    pub fn update_file(&self, path: &Path) -> IndexResult<FileUpdate> {
        let path = normalize_path(path);
        self.with_file_lock(&path, || {
            let record = self.scan_file(&path)?;
            self.mark_touched(&path);
            if record.is_empty() {
                self.records.remove(&path);
                crate::debug_event!("index", "cleared", "{}", path.display());
                Ok(FileUpdate::Removed)
            } else {
                let markers = record.len();
                self.records.insert(path.clone(), record);
                crate::debug_event!("index", "updated", "{} ({markers})", path.display());
                Ok(FileUpdate::Replaced { markers })
            }
        })
    }

    /// Drop the entry of a deleted, moved or renamed file.
    pub fn remove_file(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.with_file_lock(&path, || {
            self.mark_touched(&path);
            self.records.remove(&path).is_some()
        })
    }

    /// Drop the entries of several files. Returns how many entries existed.
    pub fn remove_paths<I, P>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .filter(|p| self.remove_file(p.as_ref()))
            .count()
    }

    /// Qualified names whose current record maps to `value`.
    pub fn types_with_marker(&self, value: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for entry in self.records.iter() {
            names.extend(
                entry
                    .value()
                    .iter()
                    .filter(|(_, v)| v.as_str() == value)
                    .map(|(name, _)| name.clone()),
            );
        }
        names
    }

    /// Marker values carried by more than one declaration.
    pub fn duplicates(&self) -> DuplicateGroups {
        let mut groups: DuplicateGroups = BTreeMap::new();
        for entry in self.records.iter() {
            for (name, value) in entry.value().iter() {
                groups.entry(value.clone()).or_default().insert(name.clone());
            }
        }
        groups.retain(|_, names| names.len() > 1);
        groups
    }

    /// Duplicate groups whose value also occurs in `path`'s record.
    pub fn duplicates_in(&self, path: &Path) -> DuplicateGroups {
        let path = normalize_path(path);
        let Some(values) = self
            .records
            .get(&path)
            .map(|r| r.values().cloned().collect::<BTreeSet<_>>())
        else {
            return BTreeMap::new();
        };

        let mut groups = self.duplicates();
        groups.retain(|value, _| values.contains(value));
        groups
    }

    /// Snapshot of one file's record.
    pub fn record(&self, path: &Path) -> Option<MarkerRecord> {
        self.records.get(&normalize_path(path)).map(|r| r.clone())
    }

    pub fn file_count(&self) -> usize {
        self.records.len()
    }

    pub fn indexed_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.records.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Tear down: forget every record and mark the index not-ready.
    pub fn clear(&self) {
        let _guard = self.build_lock.lock();
        self.ready.store(false, Ordering::Release);
        self.records.clear();
        crate::debug_event!("index", "cleared all");
    }

    /// Run `f` holding `path`'s update lock.
    fn with_file_lock<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(self.file_locks.entry(path.to_path_buf()).or_default().value());
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // The shard lock held by `remove_if` keeps anyone from cloning the
        // entry between the count check and the removal.
        self.file_locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn mark_touched(&self, path: &Path) {
        if let Some(touched) = self.touched_during_build.lock().as_mut() {
            touched.insert(path.to_path_buf());
        }
    }

    fn was_touched_during_build(&self, path: &Path) -> bool {
        self.touched_during_build
            .lock()
            .as_ref()
            .is_some_and(|touched| touched.contains(path))
    }

    fn scan_file(&self, path: &Path) -> IndexResult<MarkerRecord> {
        let scan_err = |source| IndexError::Scan {
            path: path.to_path_buf(),
            source,
        };

        let declarations = self
            .source
            .marked_declarations(path, &self.marker_kind)
            .map_err(scan_err)?;

        let mut record = MarkerRecord::new();
        for decl in declarations {
            let value = self
                .source
                .marker_value(&decl, &self.marker_kind)
                .map_err(scan_err)?;
            match value {
                Some(value) if !self.policy.ignores(&value) => {
                    record.insert(decl.qualified_name(), value);
                }
                Some(_) => {}
                None => {
                    crate::debug_event!("index", "unresolved", "{decl}");
                }
            }
        }
        Ok(record)
    }
}
