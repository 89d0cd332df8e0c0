//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod scan;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::engine::Engine;
use crate::source::AnnotationSourceModel;
use crate::storage::FsStorage;

/// Root to operate on: the explicit argument, else the workspace root, else
/// the current directory. Canonicalized so watcher paths match index keys.
pub fn resolve_root(explicit: Option<PathBuf>, settings: &Settings) -> anyhow::Result<PathBuf> {
    let root = explicit
        .or_else(|| settings.workspace_root.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    root.canonicalize()
        .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", root.display()))
}

/// An engine over the annotated sources below `root`.
pub fn engine_for(root: &Path, settings: &Settings) -> Engine {
    let source = AnnotationSourceModel::new(root, settings.index.extensions.clone())
        .with_ignore_patterns(settings.index.ignore_patterns.clone());
    Engine::new(
        settings.clone(),
        Arc::new(source),
        Arc::new(FsStorage::new(root)),
    )
}
