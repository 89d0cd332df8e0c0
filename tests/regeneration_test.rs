//! Regeneration cycles end to end: annotated sources on disk, a generator,
//! and file-system storage.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use markwatch::config::Settings;
use markwatch::engine::Engine;
use markwatch::regen::{ArtifactGenerator, GeneratorFactory, HandlerFactory};
use markwatch::source::{AnnotationSourceModel, DeclarationCriteria, SourceModel};
use markwatch::storage::{FsStorage, MemoryStorage, Storage};
use markwatch::types::{DeclarationRef, FactoryKind, Scope};
use markwatch::watcher::DebounceBuffer;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Writes `<root>/generated/<SimpleName>Marker.txt` holding the marker value.
struct MarkerListing {
    root: PathBuf,
}

impl ArtifactGenerator for MarkerListing {
    fn artifact_path(&self, decl: &DeclarationRef) -> PathBuf {
        self.root
            .join("generated")
            .join(format!("{}Marker.txt", decl.simple_name()))
    }

    fn render(&self, decl: &DeclarationRef, source: &dyn SourceModel) -> anyhow::Result<Vec<u8>> {
        let value = source
            .marker_value(decl, "Marker")?
            .ok_or_else(|| anyhow::anyhow!("{decl} lost its marker"))?;
        Ok(format!("{}={value}\n", decl.qualified_name()).into_bytes())
    }
}

fn write_source(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn settings(limit: usize) -> Settings {
    let mut settings = Settings::default();
    settings.debounce.index_quiet_ms = 50;
    settings.debounce.regen_quiet_ms = 50;
    settings.regeneration.bulk_update_limit = limit;
    settings
}

fn disk_engine(root: &Path, limit: usize) -> Engine {
    let source = AnnotationSourceModel::new(root, vec!["java".to_string()]);
    let engine = Engine::new(
        settings(limit),
        Arc::new(source),
        Arc::new(FsStorage::new(root)),
    );
    engine.add_handler_factory(Arc::new(GeneratorFactory::new(
        FactoryKind::from_static("marker-listing"),
        DeclarationCriteria::new("Marker"),
        Arc::new(MarkerListing {
            root: root.to_path_buf(),
        }),
    )));
    engine
}

#[tokio::test]
async fn test_cycle_writes_artifacts_for_eligible_declarations() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_source(
        root,
        "core/Widget.java",
        "package com.acme;\n\n@Marker(\"w-1\")\npublic class Widget {}\n",
    );
    write_source(
        root,
        "core/Base.java",
        "package com.acme;\n\n@Marker(\"b-1\")\npublic abstract class Base {}\n",
    );

    let engine = disk_engine(root, 100);
    let report = engine.regenerate(Scope::Project).await.unwrap();

    assert!(report.success(), "{report:?}");
    assert_eq!(report.handlers, 1);
    let artifact = root.join("generated/WidgetMarker.txt");
    assert_eq!(fs::read_to_string(artifact).unwrap(), "com.acme.Widget=w-1\n");
    assert!(!root.join("generated/BaseMarker.txt").exists());

    engine.dispose().await;
}

#[tokio::test]
async fn test_cycle_without_candidates_opens_no_transaction() {
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), "Plain.java", "public class Plain {}\n");

    let engine = disk_engine(dir.path(), 100);
    let report = engine.regenerate(Scope::Project).await.unwrap();

    assert_eq!(report.handlers, 0);
    assert!(!report.transaction_opened);
    assert!(report.commit.written.is_empty());
    assert!(!dir.path().join("generated").exists());
}

#[tokio::test]
async fn test_limit_of_one_checkpoints_between_two_handlers() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_source(root, "a/A.java", "package p;\n@Marker(\"a\")\npublic class A {}\n");
    write_source(root, "b/B.java", "package p;\n@Marker(\"b\")\npublic class B {}\n");

    let engine = disk_engine(root, 1);
    let report = engine.regenerate(Scope::Project).await.unwrap();

    assert_eq!(report.handlers, 2);
    assert_eq!(report.checkpoints, 1);
    assert_eq!(report.commit.written.len(), 2);
}

#[tokio::test]
async fn test_triggered_scope_only_regenerates_changed_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = write_source(root, "A.java", "package p;\n@Marker(\"a\")\npublic class A {}\n");
    write_source(root, "B.java", "package p;\n@Marker(\"b\")\npublic class B {}\n");

    let engine = disk_engine(root, 100);
    let mut reports = engine.pipeline().subscribe();

    engine.trigger_regeneration(Scope::file(&a));
    let report = tokio::time::timeout(Duration::from_secs(10), reports.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.handlers, 1);
    assert!(root.join("generated/AMarker.txt").exists());
    assert!(!root.join("generated/BMarker.txt").exists());
    engine.dispose().await;
}

#[tokio::test]
async fn test_read_only_artifact_blocks_cycle_commit() {
    let storage = Arc::new(MemoryStorage::new());
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_source(root, "A.java", "package p;\n@Marker(\"a\")\npublic class A {}\n");
    write_source(root, "B.java", "package p;\n@Marker(\"b\")\npublic class B {}\n");

    let engine = Engine::new(
        settings(100),
        Arc::new(AnnotationSourceModel::new(root, vec!["java".to_string()])),
        Arc::clone(&storage) as Arc<dyn Storage>,
    );
    let generator = MarkerListing {
        root: PathBuf::from("out"),
    };
    storage.set_read_only("out/generated/BMarker.txt");
    let factory: Arc<dyn HandlerFactory> = Arc::new(GeneratorFactory::new(
        FactoryKind::from_static("listing"),
        DeclarationCriteria::new("Marker"),
        Arc::new(generator),
    ));
    engine.add_handler_factory(factory);

    let report = engine.regenerate(Scope::Project).await.unwrap();
    assert!(!report.success());
    assert_eq!(report.commit.rejected.len(), 1);
    assert_eq!(storage.file_count(), 0);
}

#[tokio::test]
async fn test_edits_reindex_after_quiet_period() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let x = write_source(root, "X.java", "package p;\n@Marker(\"1a2b\")\npublic class X {}\n");
    write_source(root, "Y.java", "package p;\n@Marker(\"1a2b\")\npublic class Y {}\n");

    let engine = disk_engine(root, 100);
    engine.build_index(Scope::Project).await;
    assert_eq!(engine.duplicates().len(), 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_index_flush(move |batch| {
        let _ = tx.send(batch.clone());
    });

    fs::write(&x, "package p;\npublic class X {}\n").unwrap();
    engine.trigger_reindex(&x);
    engine.trigger_reindex(&x);

    let batch = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.cleared.len(), 1);
    assert!(engine.duplicates().is_empty());
    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_debounce_delivers_one_batch_per_quiet_window() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let buffer = DebounceBuffer::spawn("scenario", Duration::from_secs(2), move |batch: HashSet<&'static str>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(batch);
        }
    });

    buffer.submit("A");
    buffer.submit("B");
    buffer.submit("A");

    assert_eq!(rx.recv().await.unwrap(), HashSet::from(["A", "B"]));
    buffer.close().await;
    assert!(rx.recv().await.is_none());
}
