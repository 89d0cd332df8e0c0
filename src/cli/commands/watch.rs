//! Watch command: build once, then follow file changes until Ctrl-C.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::engine_for;
use super::scan::format_duplicates;
use crate::config::Settings;
use crate::index::DuplicateGroups;
use crate::types::Scope;
use crate::watcher::FsWatcher;

/// Run watch command.
pub async fn run_watch(settings: &Settings, root: &Path) -> anyhow::Result<ExitCode> {
    let engine = Arc::new(engine_for(root, settings));

    let status = engine.build_index(Scope::Project).await;
    if !status.is_ready() {
        anyhow::bail!("failed to index {}", root.display());
    }

    let duplicates = engine.duplicates();
    if !duplicates.is_empty() {
        print!("{}", format_duplicates(&duplicates));
    }

    // Re-report duplicates touching every re-indexed batch.
    let reporter = Arc::downgrade(&engine);
    engine.on_index_flush(move |batch| {
        let Some(engine) = reporter.upgrade() else {
            return;
        };
        let mut touched = DuplicateGroups::new();
        for path in batch.touched() {
            touched.extend(engine.duplicates_in(path));
        }
        if !touched.is_empty() {
            print!("{}", format_duplicates(&touched));
        }
    });

    let shutdown = CancellationToken::new();
    let watcher = FsWatcher::new(Arc::clone(&engine), root)?;
    let watching = tokio::spawn(watcher.run(shutdown.clone()));

    println!("Watching {} (Ctrl-C to stop)", root.display());
    tokio::signal::ctrl_c().await?;
    shutdown.cancel();

    match watching.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("[watcher] {e}"),
        Err(e) => tracing::error!("[watcher] task failed: {e}"),
    }
    engine.dispose().await;
    Ok(ExitCode::SUCCESS)
}
