//! Read path over the progress ledger
//!
//! Queries copy a record out of the ledger and derive elapsed time and an
//! average speed from it. They never mutate anything.

use crate::error::{Result, StorageError};
use crate::progress::ledger::{ProgressLedger, ProgressRecord, TransferState};
use crate::progress::task::{TaskRecord, TaskState};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Instant;

/// Lower bound for elapsed time, keeps speed finite right after registration
pub const MIN_ELAPSED_SECS: f64 = 0.01;

/// Serialize an unknown size as -1 for consumers that expect a plain number
fn serialize_unknown_as_negative<S>(
    value: &Option<u64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(v) => serializer.serialize_i64(i64::try_from(*v).unwrap_or(i64::MAX)),
        None => serializer.serialize_i64(-1),
    }
}

fn elapsed_secs(started: Instant, now: Instant) -> f64 {
    now.saturating_duration_since(started)
        .as_secs_f64()
        .max(MIN_ELAPSED_SECS)
}

/// Normalized view of one file download
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub task_id: String,
    pub local_path: PathBuf,
    /// Size reported by the store, `None` (serialized as -1) while unknown
    #[serde(serialize_with = "serialize_unknown_as_negative")]
    pub total_bytes: Option<u64>,
    pub bytes_retrieved: u64,
    /// Average since registration, not a sliding window
    pub speed_bps: f64,
    pub elapsed_time_sec: f64,
    pub state: TransferState,
    pub is_completed: bool,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ProgressInfo {
    /// Derive the view of `record` as seen at `now`
    pub fn from_record(record: &ProgressRecord, now: Instant) -> Self {
        let elapsed = elapsed_secs(record.started, now);

        Self {
            task_id: record.task_id.clone(),
            local_path: record.local_path.clone(),
            total_bytes: record.total_bytes,
            bytes_retrieved: record.bytes_retrieved,
            speed_bps: record.bytes_retrieved as f64 / elapsed,
            elapsed_time_sec: elapsed,
            state: record.state,
            is_completed: record.state == TransferState::Completed,
            has_error: record.state == TransferState::Failed,
            error_message: record.error_message.clone(),
            started_at: record.started_at,
        }
    }

    /// Fraction done in 0.0..=1.0, `None` while the size is unknown
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(if self.is_completed { 1.0 } else { 0.0 }),
            Some(total) => Some((self.bytes_retrieved as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(StorageError::from)
    }
}

/// Aggregate view of one selective download and all of its files
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub prefix: String,
    pub root_cid: String,
    pub state: TaskState,
    pub walk_finished: bool,
    pub directories_walked: usize,
    pub files_scheduled: usize,
    pub files_completed: usize,
    pub files_failed: usize,
    pub files_in_flight: usize,
    pub bytes_retrieved: u64,
    /// Sum of file sizes, `None` (serialized as -1) while any size is unknown
    #[serde(serialize_with = "serialize_unknown_as_negative")]
    pub total_bytes: Option<u64>,
    pub speed_bps: f64,
    pub elapsed_time_sec: f64,
    pub entries_skipped: usize,
    pub listing_failures: Vec<String>,
    pub unmatched_selections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl TaskSummary {
    /// Combine an aggregate record with the file records under its prefix
    pub fn from_records(task: &TaskRecord, files: &[ProgressRecord], now: Instant) -> Self {
        let elapsed = elapsed_secs(task.started, now);

        let mut files_completed = 0;
        let mut files_failed = 0;
        let mut bytes_retrieved = 0u64;
        let mut total_bytes = Some(0u64);

        for record in files {
            match record.state {
                TransferState::Completed => files_completed += 1,
                TransferState::Failed => files_failed += 1,
                _ => {}
            }
            bytes_retrieved = bytes_retrieved.saturating_add(record.bytes_retrieved);
            total_bytes = match (total_bytes, record.total_bytes) {
                (Some(sum), Some(size)) => Some(sum.saturating_add(size)),
                _ => None,
            };
        }

        // Records only exist for files already reached while the walk runs
        let files_scheduled = if task.walk_finished {
            task.report.files_scheduled
        } else {
            files.len()
        };

        Self {
            prefix: task.prefix.clone(),
            root_cid: task.root_cid.clone(),
            state: task.state,
            walk_finished: task.walk_finished,
            directories_walked: task.report.directories_walked,
            files_scheduled,
            files_completed,
            files_failed,
            files_in_flight: files_scheduled.saturating_sub(files_completed + files_failed),
            bytes_retrieved,
            total_bytes,
            speed_bps: bytes_retrieved as f64 / elapsed,
            elapsed_time_sec: elapsed,
            entries_skipped: task.report.entries_skipped,
            listing_failures: task.report.listing_failures.clone(),
            unmatched_selections: task.report.unmatched_selections.clone(),
            error_message: task.error_message.clone(),
            started_at: task.started_at,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(StorageError::from)
    }
}

impl ProgressLedger {
    /// Progress of one file download
    pub fn query(&self, task_id: &str) -> Result<ProgressInfo> {
        let record = self.get(task_id)?;
        Ok(ProgressInfo::from_record(&record, Instant::now()))
    }

    /// Progress of a whole selective download
    pub fn summarize(&self, prefix: &str) -> Result<TaskSummary> {
        let task = self.task(prefix)?;
        let files = self.records_with_prefix(prefix);
        Ok(TaskSummary::from_records(&task, &files, Instant::now()))
    }
}
