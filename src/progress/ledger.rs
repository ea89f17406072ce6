//! Concurrent progress ledger
//!
//! Every file download owns one [`ProgressRecord`] keyed by its task id.
//! Each record sits behind its own mutex, so a mutation is a single
//! read-modify-write step and writers on different keys never contend
//! beyond the short map lookup.

use crate::error::{Result, StorageError};
use crate::progress::task::TaskRecord;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Lifecycle of a single file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Registered, waiting for a worker
    Pending,
    /// Resolving the content and asking for its size
    Sizing,
    /// Bytes are flowing
    Transferring,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Pending => write!(f, "pending"),
            TransferState::Sizing => write!(f, "sizing"),
            TransferState::Transferring => write!(f, "transferring"),
            TransferState::Completed => write!(f, "completed"),
            TransferState::Failed => write!(f, "failed"),
        }
    }
}

/// Progress of one file download
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    /// Ledger key
    pub task_id: String,
    /// Content being downloaded
    pub cid: String,
    /// Where the file is written
    pub local_path: PathBuf,
    /// Size reported by the store, `None` while unknown
    pub total_bytes: Option<u64>,
    /// Bytes written to `local_path` so far
    pub bytes_retrieved: u64,
    /// Wall-clock registration time
    pub started_at: DateTime<Utc>,
    /// Monotonic registration time, used for elapsed time and speed
    pub started: Instant,
    pub state: TransferState,
    pub error_message: Option<String>,
}

impl ProgressRecord {
    /// Create a pending record with an unknown size
    pub fn new(
        task_id: impl Into<String>,
        cid: impl Into<String>,
        local_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            cid: cid.into(),
            local_path: local_path.as_ref().to_path_buf(),
            total_bytes: None,
            bytes_retrieved: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            state: TransferState::Pending,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn restart_clock(&mut self) {
        self.started_at = Utc::now();
        self.started = Instant::now();
    }

    /// Pending -> Sizing
    pub fn begin_sizing(&mut self) {
        if self.state == TransferState::Pending {
            self.state = TransferState::Sizing;
        }
    }

    /// Record the size reported by the store. Only the first known size is
    /// kept; returns whether it was applied.
    pub fn set_total_bytes(&mut self, total: u64) -> bool {
        if self.total_bytes.is_some() || self.is_terminal() {
            return false;
        }
        self.total_bytes = Some(total);
        true
    }

    /// Enter the transferring state unless already finished
    pub fn begin_transfer(&mut self) {
        if !self.is_terminal() {
            self.state = TransferState::Transferring;
        }
    }

    /// Publish the running byte count. Never moves backwards and is ignored
    /// outside of `Transferring`.
    pub fn record_bytes(&mut self, bytes: u64) {
        if self.state == TransferState::Transferring {
            self.bytes_retrieved = self.bytes_retrieved.max(bytes);
        }
    }

    /// Mark the transfer completed with its final byte count. The total is
    /// reconciled with what was actually written.
    pub fn complete(&mut self, bytes: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.bytes_retrieved = bytes;
        self.total_bytes = Some(bytes);
        self.state = TransferState::Completed;
        true
    }

    /// Mark the transfer failed. The first terminal state wins.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TransferState::Failed;
        self.error_message = Some(message.into());
        true
    }
}

/// Shared handle to one ledger entry
///
/// Handed out on registration so the owner can mutate its entry without a
/// map lookup per update.
#[derive(Debug)]
pub struct LedgerEntry<T> {
    id: String,
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for LedgerEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> LedgerEntry<T> {
    fn new(id: String, value: T) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(value)),
        }
    }

    // A panic while holding the lock cannot leave a record half-written in a
    // way that matters more than losing the update, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Apply `f` to the entry as one atomic read-modify-write step
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the current value
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}

pub type RecordHandle = LedgerEntry<ProgressRecord>;
pub type TaskHandle = LedgerEntry<TaskRecord>;

/// Concurrent store of progress records keyed by task id
///
/// Aggregate [`TaskRecord`]s for whole orchestration calls live next to the
/// per-file records, keyed by task prefix.
#[derive(Debug, Default)]
pub struct ProgressLedger {
    records: RwLock<HashMap<String, RecordHandle>>,
    tasks: RwLock<HashMap<String, TaskHandle>>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its task id and return a handle to it
    ///
    /// A live id that is registered again is reset, not rejected: the new
    /// record replaces the old one and a warning is logged. The start time
    /// is taken under the map lock, so the last registration always carries
    /// the freshest start time.
    pub fn register(&self, mut record: ProgressRecord) -> RecordHandle {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        record.restart_clock();
        let id = record.task_id.clone();
        let handle = RecordHandle::new(id.clone(), record);
        if records.insert(id.clone(), handle.clone()).is_some() {
            warn!("Download ID {} already exists. Overwriting progress.", id);
        }
        handle
    }

    /// Handle to a registered record
    pub fn handle(&self, id: &str) -> Result<RecordHandle> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id))
    }

    /// Apply `f` to the current record of `id` as one atomic step
    pub fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut ProgressRecord) -> R) -> Result<R> {
        Ok(self.handle(id)?.mutate(f))
    }

    /// Copy of the record registered under `id`
    pub fn get(&self, id: &str) -> Result<ProgressRecord> {
        Ok(self.handle(id)?.snapshot())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Number of file records
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of every file record created under a task prefix
    pub fn records_with_prefix(&self, prefix: &str) -> Vec<ProgressRecord> {
        let scope = format!("{}{}", prefix, super::TASK_ID_DELIMITER);
        let handles: Vec<RecordHandle> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id.starts_with(&scope))
            .map(|(_, handle)| handle.clone())
            .collect();

        handles.iter().map(RecordHandle::snapshot).collect()
    }

    /// Insert the aggregate record of an orchestration call
    pub fn register_task(&self, task: TaskRecord) -> TaskHandle {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let prefix = task.prefix.clone();
        let handle = TaskHandle::new(prefix.clone(), task);
        if tasks.insert(prefix.clone(), handle.clone()).is_some() {
            warn!("Task prefix {} already exists. Overwriting task status.", prefix);
        }
        handle
    }

    /// Copy of the aggregate record of `prefix`
    pub fn task(&self, prefix: &str) -> Result<TaskRecord> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(prefix)
            .map(TaskHandle::snapshot)
            .ok_or_else(|| StorageError::not_found(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_register_and_get() {
        let ledger = ProgressLedger::new();
        assert!(ledger.is_empty());

        ledger.register(ProgressRecord::new("t:a", "zabc", "/tmp/a"));
        let record = ledger.get("t:a").unwrap();
        assert_eq!(record.state, TransferState::Pending);
        assert_eq!(record.total_bytes, None);
        assert_eq!(record.bytes_retrieved, 0);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("t:a"));
    }

    #[test]
    fn test_get_unknown_id() {
        let ledger = ProgressLedger::new();
        assert!(matches!(
            ledger.get("missing"),
            Err(StorageError::NotFound { .. })
        ));
        assert!(ledger.mutate("missing", |_| ()).is_err());
    }

    #[test]
    fn test_duplicate_registration_resets_record() {
        let ledger = ProgressLedger::new();
        let first = ledger.register(ProgressRecord::new("t:a", "zabc", "/tmp/a"));
        first.mutate(|r| {
            r.begin_transfer();
            r.record_bytes(10);
        });
        let first_start = first.snapshot().started;

        let second = ledger.register(ProgressRecord::new("t:a", "zabc", "/tmp/a"));
        let record = ledger.get("t:a").unwrap();
        assert_eq!(record.bytes_retrieved, 0);
        assert_eq!(record.state, TransferState::Pending);
        assert!(record.started >= first_start);

        // The old handle no longer reaches the ledger
        first.mutate(|r| r.fail("stale"));
        assert_eq!(second.snapshot().state, TransferState::Pending);
        assert_eq!(ledger.get("t:a").unwrap().state, TransferState::Pending);
    }

    #[test]
    fn test_bytes_are_monotonic_and_gated_on_state() {
        let mut record = ProgressRecord::new("t:a", "zabc", "/tmp/a");
        record.record_bytes(5);
        assert_eq!(record.bytes_retrieved, 0);

        record.begin_transfer();
        record.record_bytes(5);
        record.record_bytes(3);
        assert_eq!(record.bytes_retrieved, 5);

        assert!(record.complete(8));
        record.record_bytes(100);
        assert_eq!(record.bytes_retrieved, 8);
    }

    #[test]
    fn test_total_bytes_set_once() {
        let mut record = ProgressRecord::new("t:a", "zabc", "/tmp/a");
        assert!(record.set_total_bytes(100));
        assert!(!record.set_total_bytes(200));
        assert_eq!(record.total_bytes, Some(100));
    }

    #[test]
    fn test_complete_reconciles_total() {
        let mut record = ProgressRecord::new("t:a", "zabc", "/tmp/a");
        record.begin_transfer();
        record.record_bytes(100);
        assert!(record.complete(100));
        assert_eq!(record.total_bytes, Some(100));
        assert_eq!(record.bytes_retrieved, 100);
    }

    #[test]
    fn test_single_terminal_state() {
        let mut record = ProgressRecord::new("t:a", "zabc", "/tmp/a");
        assert!(record.fail("boom"));
        assert!(!record.complete(10));
        assert!(!record.fail("again"));
        record.begin_transfer();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_concurrent_mutations_do_not_lose_updates() {
        let ledger = Arc::new(ProgressLedger::new());
        ledger.register(ProgressRecord::new("t:a", "zabc", "/tmp/a"));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        ledger
                            .mutate("t:a", |r| r.bytes_retrieved += 1)
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(ledger.get("t:a").unwrap().bytes_retrieved, 8000);
    }

    #[test]
    fn test_records_with_prefix() {
        let ledger = ProgressLedger::new();
        ledger.register(ProgressRecord::new("task_1:a/x.txt", "z1", "/tmp/x"));
        ledger.register(ProgressRecord::new("task_1:a/y.txt", "z2", "/tmp/y"));
        ledger.register(ProgressRecord::new("task_12:a/x.txt", "z3", "/tmp/z"));

        let mut ids: Vec<String> = ledger
            .records_with_prefix("task_1")
            .into_iter()
            .map(|r| r.task_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["task_1:a/x.txt", "task_1:a/y.txt"]);
    }
}
