//! Change observation: debouncing and the file-system watcher.
//!
//! ```text
//! notify ──> FsWatcher ──translate──> Engine::trigger_* ──> DebounceBuffer ──> flush
//! ```

mod debouncer;
mod error;
mod fs;

pub use debouncer::DebounceBuffer;
pub use error::{WatchError, WatchResult};
pub use fs::{FsWatcher, WatchAction, translate};
