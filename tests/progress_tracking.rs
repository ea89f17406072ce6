//! Progress tracking integration tests
//!
//! Polls the ledger while transfers are running and checks what it reports
//! once they have finished, including the failure paths.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use storage_selective::{
    download_file, query_progress, query_task, start_selective_download, task_id, MemoryStore,
    ProgressLedger, ProgressRecord, SessionConfig, StorageError, StorageSession, TaskState,
    TaskSummary, TransferState,
};
use tempfile::tempdir;
use tokio_test::assert_ok;

fn started_session(store: &MemoryStore, config: SessionConfig) -> StorageSession {
    let _ = env_logger::try_init();
    let session = StorageSession::new(store.clone(), config).unwrap();
    session.start().unwrap();
    session
}

async fn wait_for_task(session: &StorageSession, prefix: &str) -> TaskSummary {
    for _ in 0..1000 {
        let summary = query_task(session, prefix).expect("task should be registered");
        if summary.state.is_terminal() {
            return summary;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish in time", prefix);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_size_query_is_reconciled_on_completion() {
    let store = MemoryStore::new();
    let data = store.add_file(vec![42u8; 100]);
    store.fail_size(&data);
    let root = store.add_directory([("data.bin", data)]).unwrap();
    let session = started_session(&store, SessionConfig::default());
    let out = tempdir().unwrap();

    let prefix = start_selective_download(&session, root.as_str(), out.path(), ["data.bin"])
        .await
        .unwrap();
    wait_for_task(&session, &prefix).await;

    let info = query_progress(&session, &task_id(&prefix, "data.bin")).unwrap();
    assert_eq!(info.state, TransferState::Completed);
    assert!(!info.has_error);
    assert_eq!(info.total_bytes, Some(100));
    assert_eq!(info.bytes_retrieved, 100);
    assert_eq!(std::fs::read(out.path().join("data.bin")).unwrap().len(), 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_copy_error_removes_partial_file() {
    let store = MemoryStore::new();
    let broken = store.add_file(vec![1u8; 100]);
    let fine = store.add_file(vec![2u8; 100]);
    store.break_stream_after(&broken, 50);
    let root = store
        .add_directory([("broken.bin", broken), ("fine.bin", fine)])
        .unwrap();
    let session = started_session(&store, SessionConfig::new().copy_buffer_size(10));
    let out = tempdir().unwrap();

    let prefix = start_selective_download(&session, root.as_str(), out.path(), ["."])
        .await
        .unwrap();
    let summary = wait_for_task(&session, &prefix).await;
    assert_eq!(summary.state, TaskState::Done);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.files_completed, 1);

    let info = query_progress(&session, &task_id(&prefix, "broken.bin")).unwrap();
    assert_eq!(info.state, TransferState::Failed);
    assert!(info.has_error);
    assert!(!info.error_message.unwrap_or_default().is_empty());
    assert!(!out.path().join("broken.bin").exists());

    assert!(out.path().join("fine.bin").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bytes_retrieved_never_decrease_while_transferring() {
    let store = MemoryStore::new();
    let big = store.add_file(vec![9u8; 4000]);
    let root = store.add_directory([("big.bin", big)]).unwrap();
    store.set_read_chunk(100);
    store.set_read_delay(Duration::from_millis(2));
    let session = started_session(&store, SessionConfig::default());
    let out = tempdir().unwrap();

    let prefix = start_selective_download(&session, root.as_str(), out.path(), ["big.bin"])
        .await
        .unwrap();
    let id = task_id(&prefix, "big.bin");

    let mut last = 0u64;
    let mut transferring_polls = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(info) = query_progress(&session, &id) {
            if info.state == TransferState::Transferring {
                assert!(
                    info.bytes_retrieved >= last,
                    "bytes went from {} to {}",
                    last,
                    info.bytes_retrieved
                );
                last = info.bytes_retrieved;
                transferring_polls += 1;
            }
            if info.state.is_terminal() {
                assert_eq!(info.bytes_retrieved, 4000);
                break;
            }
        }
        assert!(Instant::now() < deadline, "transfer did not finish");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(transferring_polls > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_files_waiting_for_a_worker_are_pending() {
    let store = MemoryStore::new();
    let first = store.add_file(vec![1u8; 400]);
    let second = store.add_file(vec![2u8; 400]);
    let root = store
        .add_directory([("first.bin", first), ("second.bin", second)])
        .unwrap();
    store.set_read_chunk(20);
    store.set_read_delay(Duration::from_millis(5));
    let session = started_session(&store, SessionConfig::new().max_concurrent_downloads(1));
    let out = tempdir().unwrap();

    let prefix = start_selective_download(&session, root.as_str(), out.path(), ["."])
        .await
        .unwrap();

    let mut saw_pending_behind_active = false;
    loop {
        let records = session.ledger().records_with_prefix(&prefix);
        let pending = records
            .iter()
            .filter(|r| r.state == TransferState::Pending)
            .count();
        let active = records
            .iter()
            .filter(|r| r.state == TransferState::Transferring)
            .count();
        if records.len() == 2 && pending == 1 && active == 1 {
            saw_pending_behind_active = true;
        }

        let summary = assert_ok!(query_task(&session, &prefix));
        if summary.state.is_terminal() {
            assert_eq!(summary.files_completed, 2);
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(saw_pending_behind_active);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_file_reports_under_task_id() {
    let store = MemoryStore::new();
    let cid = store.add_file("single file content");
    let session = started_session(&store, SessionConfig::default());
    let out = tempdir().unwrap();
    let path = out.path().join("deep/down/single.txt");

    let result = download_file(&session, cid.as_str(), &path, "single")
        .await
        .unwrap();
    assert_eq!(result.size, 19);
    assert_eq!(result.task_id, "single");
    assert_eq!(result.filepath, path);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "single file content");

    let info = query_progress(&session, "single").unwrap();
    assert!(info.is_completed);
    assert_eq!(info.percentage(), Some(1.0));

    let json: serde_json::Value = serde_json::from_str(&info.to_json().unwrap()).unwrap();
    assert_eq!(json["taskId"], "single");
    assert_eq!(json["totalBytes"], 19);
    assert_eq!(json["isCompleted"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_file_failure_is_returned_and_recorded() {
    let store = MemoryStore::new();
    let cid = store.add_file("will not resolve");
    store.fail_resolve(&cid);
    let session = started_session(&store, SessionConfig::default());
    let out = tempdir().unwrap();
    let path = out.path().join("never.txt");

    let err = download_file(&session, cid.as_str(), &path, "doomed")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Resolution { .. }));
    assert!(!path.exists());

    let info = query_progress(&session, "doomed").unwrap();
    assert!(info.has_error);
    assert_eq!(info.total_bytes, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_unknown_ids() {
    let store = MemoryStore::new();
    let session = started_session(&store, SessionConfig::default());

    assert!(matches!(
        query_progress(&session, "task_0:nothing"),
        Err(StorageError::NotFound { .. })
    ));
    assert!(matches!(
        query_task(&session, "task_0"),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn test_concurrent_duplicate_registration_keeps_latest_start() {
    let ledger = Arc::new(ProgressLedger::new());

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| {
                        let before = Instant::now();
                        let handle = ledger
                            .register(ProgressRecord::new("task_1:same", "zabc", "/tmp/same"));
                        handle.mutate(|r| {
                            r.begin_transfer();
                            r.record_bytes(7);
                        });
                        before
                    })
                    .max()
                    .unwrap()
            })
        })
        .collect();

    let latest = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .max()
        .unwrap();

    let record = ledger.get("task_1:same").unwrap();
    assert!(record.started >= latest);
    assert_eq!(ledger.len(), 1);
}
