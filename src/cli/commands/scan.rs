//! Scan command: one full build, then a duplicate report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use super::engine_for;
use crate::config::Settings;
use crate::index::{BuildStatus, DuplicateGroups};
use crate::types::Scope;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub marker_kind: String,
    pub files: usize,
    pub markers: usize,
    pub duplicates: DuplicateGroups,
}

/// Run scan command. Exits with 1 when duplicates exist.
pub async fn run_scan(settings: &Settings, root: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let engine = engine_for(root, settings);

    let (files, markers) = match engine.build_index(Scope::Project).await {
        BuildStatus::Built { files, markers } => (files, markers),
        BuildStatus::AlreadyBuilt => (engine.indexed_paths().len(), 0),
        BuildStatus::Failed => anyhow::bail!("failed to index {}", root.display()),
        BuildStatus::Cancelled => anyhow::bail!("indexing of {} was cancelled", root.display()),
    };

    let report = ScanReport {
        root: root.to_path_buf(),
        marker_kind: settings.index.marker_kind.clone(),
        files,
        markers,
        duplicates: engine.duplicates(),
    };
    engine.dispose().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Indexed {} @{} markers in {} files under {}",
            report.markers,
            report.marker_kind,
            report.files,
            report.root.display()
        );
        if report.duplicates.is_empty() {
            println!("No duplicate markers.");
        } else {
            print!("{}", format_duplicates(&report.duplicates));
        }
    }

    Ok(if report.duplicates.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Human-readable duplicate listing, one group per block.
pub fn format_duplicates(groups: &DuplicateGroups) -> String {
    let mut out = String::new();
    for (value, names) in groups {
        let _ = writeln!(out, "Duplicate marker \"{value}\" used by {} types:", names.len());
        for name in names {
            let _ = writeln!(out, "  {name}");
        }
    }
    out
}
