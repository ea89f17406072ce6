//! Progress tracking for downloads
//!
//! The [`ProgressLedger`] is the only state shared between concurrently
//! running downloads. Writers are the download tasks themselves; readers
//! poll it through [`ProgressLedger::query`] and [`ProgressLedger::summarize`]
//! at any time.

pub mod ledger;
pub mod query;
pub mod task;

pub use ledger::{
    LedgerEntry, ProgressLedger, ProgressRecord, RecordHandle, TaskHandle, TransferState,
};
pub use query::{ProgressInfo, TaskSummary, MIN_ELAPSED_SECS};
pub use task::{TaskRecord, TaskState, WalkReport};

use crate::selection::normalize_path;

/// Separates the task prefix from the relative path in a task id
pub const TASK_ID_DELIMITER: char = ':';

/// Ledger key of the file at `relative_path` downloaded under `prefix`
///
/// The path is normalized first, so `task_id(p, "./a\\x.txt")` and
/// `task_id(p, "a/x.txt")` are the same id.
pub fn task_id(prefix: &str, relative_path: &str) -> String {
    format!(
        "{}{}{}",
        prefix,
        TASK_ID_DELIMITER,
        normalize_path(relative_path)
    )
}
