//! Aggregate status of one selective download

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Lifecycle of a whole orchestration call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Walking the tree or waiting for scheduled files
    Running,
    /// Walk finished and every scheduled file reached a terminal state
    Done,
    /// The root directory could not be listed
    WalkFailed,
    /// Stopped by `cancel_download` or by stopping the session
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Running => write!(f, "running"),
            TaskState::Done => write!(f, "done"),
            TaskState::WalkFailed => write!(f, "walk_failed"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a tree walk found, reported back to the aggregate record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub directories_walked: usize,
    pub files_scheduled: usize,
    pub entries_skipped: usize,
    /// Relative directories whose listing failed
    pub listing_failures: Vec<String>,
    /// Selected paths that were never met during the walk
    pub unmatched_selections: Vec<String>,
}

/// Aggregate record of one `start_selective_download` call
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub prefix: String,
    pub root_cid: String,
    pub local_base: PathBuf,
    pub state: TaskState,
    pub walk_finished: bool,
    pub report: WalkReport,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        prefix: impl Into<String>,
        root_cid: impl Into<String>,
        local_base: impl AsRef<Path>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            root_cid: root_cid.into(),
            local_base: local_base.as_ref().to_path_buf(),
            state: TaskState::Running,
            walk_finished: false,
            report: WalkReport::default(),
            error_message: None,
            started_at: Utc::now(),
            started: Instant::now(),
            finished_at: None,
        }
    }

    /// Store what the walk found; the task keeps running until its files
    /// are done
    pub fn finish_walk(&mut self, report: WalkReport) {
        self.walk_finished = true;
        self.report = report;
    }

    /// Move to a terminal state. The first terminal state wins.
    pub fn finish(&mut self, state: TaskState, error: Option<String>) -> bool {
        if self.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        self.state = state;
        self.error_message = error;
        self.finished_at = Some(Utc::now());
        true
    }
}
