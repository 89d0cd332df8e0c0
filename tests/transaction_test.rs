//! Commit semantics of the transaction coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use markwatch::storage::{MemoryStorage, Storage};
use markwatch::transaction::{Transaction, TransactionCoordinator, TransactionError, WriteIntent};
use tokio_util::sync::CancellationToken;

fn setup() -> (Arc<MemoryStorage>, TransactionCoordinator) {
    let storage = Arc::new(MemoryStorage::new());
    let coordinator = TransactionCoordinator::new(Arc::clone(&storage) as Arc<dyn Storage>);
    (storage, coordinator)
}

#[tokio::test]
async fn test_latest_intent_for_a_path_wins() {
    let (storage, coordinator) = setup();
    let tx = coordinator.begin(CancellationToken::new());

    tx.register(WriteIntent::with_bytes("gen/A.txt", "first")).unwrap();
    tx.register(WriteIntent::with_bytes("gen/./A.txt", "second")).unwrap();
    assert_eq!(tx.pending_count(), 1);

    let outcome = tx.finish(true).await.unwrap();
    assert!(outcome.success());
    assert_eq!(storage.get("gen/A.txt").unwrap(), b"second");
}

#[tokio::test]
async fn test_finish_without_save_writes_nothing() {
    let (storage, coordinator) = setup();
    let tx = coordinator.begin(CancellationToken::new());
    tx.register(WriteIntent::with_bytes("a.txt", "a")).unwrap();
    tx.register(WriteIntent::with_bytes("b.txt", "b")).unwrap();

    let outcome = tx.finish(false).await.unwrap();
    assert_eq!(outcome.discarded, 2);
    assert_eq!(storage.file_count(), 0);
    assert!(matches!(
        tx.register(WriteIntent::with_bytes("c.txt", "c")),
        Err(TransactionError::Closed { .. })
    ));
}

#[tokio::test]
async fn test_one_read_only_target_blocks_the_whole_commit() {
    let (storage, coordinator) = setup();
    storage.set_read_only("locked.txt");
    let tx = coordinator.begin(CancellationToken::new());
    for name in ["a.txt", "locked.txt", "b.txt"] {
        tx.register(WriteIntent::with_bytes(name, name)).unwrap();
    }

    let outcome = tx.finish(true).await.unwrap();
    assert!(!outcome.success());
    assert_eq!(outcome.rejected, vec![PathBuf::from("locked.txt")]);
    assert_eq!(storage.file_count(), 0);
}

#[tokio::test]
async fn test_failed_member_does_not_stop_others() {
    let (storage, coordinator) = setup();
    storage.fail_writes_to("bad.txt");
    let tx = coordinator.begin(CancellationToken::new());
    for name in ["a.txt", "bad.txt", "b.txt"] {
        tx.register(WriteIntent::with_bytes(name, name)).unwrap();
    }

    let outcome = tx.finish(true).await.unwrap();
    assert!(!outcome.success());
    assert_eq!(outcome.failed, vec![PathBuf::from("bad.txt")]);
    assert!(storage.contains("a.txt"));
    assert!(storage.contains("b.txt"));
}

#[tokio::test]
async fn test_checkpoint_survives_later_cancellation() {
    let (storage, coordinator) = setup();
    let cancel = CancellationToken::new();

    let ((), outcome) = coordinator
        .run_in_transaction(cancel.clone(), |tx| async move {
            tx.register(WriteIntent::with_bytes("early.txt", "1")).unwrap();
            tx.checkpoint().unwrap();
            tx.register(WriteIntent::with_bytes("late.txt", "2")).unwrap();
            cancel.cancel();
        })
        .await;

    assert!(storage.contains("early.txt"));
    assert!(!storage.contains(Path::new("late.txt")));
    assert_eq!(outcome.discarded, 1);
}

#[tokio::test]
async fn test_current_is_bound_inside_run_in_transaction() {
    let (_storage, coordinator) = setup();
    assert!(matches!(
        Transaction::current(),
        Err(TransactionError::NoTransaction)
    ));

    let (id, _) = coordinator
        .run_in_transaction(CancellationToken::new(), |tx| async move {
            let current = Transaction::current().unwrap();
            assert_eq!(current.id(), tx.id());
            current.id()
        })
        .await;
    assert!(id > 0);
}

#[tokio::test]
async fn test_panicking_producer_fails_one_member_in_spawned_finish() {
    let (storage, coordinator) = setup();
    let tx = coordinator.begin(CancellationToken::new());
    tx.register(WriteIntent::new("A.txt", || panic!("render failed"))).unwrap();
    tx.register(WriteIntent::with_bytes("B.txt", "b")).unwrap();
    tx.checkpoint().unwrap();
    tx.register(WriteIntent::with_bytes("C.txt", "c")).unwrap();

    let finishing = tx.clone();
    let outcome = tokio::spawn(async move { finishing.finish(true).await })
        .await
        .expect("finish task must not panic")
        .unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.failed, vec![PathBuf::from("A.txt")]);
    assert_eq!(outcome.aborted_tasks, 0);
    assert_eq!(storage.get("B.txt").unwrap(), b"b");
    assert_eq!(storage.get("C.txt").unwrap(), b"c");
}
