//! Incremental marker index with duplicate detection, plus a debounced,
//! transactional regeneration pipeline for derived artifacts.

pub mod cli;
pub mod config;
pub mod engine;
pub mod index;
pub mod logging;
pub mod regen;
pub mod source;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use engine::Engine;
pub use index::{BuildStatus, DuplicateGroups, IndexChange, MarkerIndex, PendingRemoval, StorageEvent};
pub use regen::{CycleHandle, CycleReport, Handler, HandlerFactory, RegenerationPipeline};
pub use source::{AnnotationSourceModel, SourceModel};
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use transaction::{Transaction, TransactionCoordinator, WriteIntent};
pub use types::{DeclarationRef, FactoryKind, MarkerValue, Scope};
