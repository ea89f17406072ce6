//! Types for download operations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of a completed single-file download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownloadResult {
    /// Ledger key the progress was published under
    pub task_id: String,
    /// Content ID (CID) of the downloaded file
    pub cid: String,
    /// Bytes written to disk
    pub size: u64,
    /// Time taken for the download (in milliseconds)
    pub duration_ms: u64,
    /// Path where the file was saved
    pub filepath: PathBuf,
}

impl FileDownloadResult {
    /// Create a new download result
    pub fn new(
        task_id: impl Into<String>,
        cid: impl Into<String>,
        size: u64,
        filepath: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            cid: cid.into(),
            size,
            duration_ms: 0,
            filepath: filepath.into(),
        }
    }

    /// Set the duration
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Human readable size, e.g. "1.0 MiB"
    pub fn size_display(&self) -> String {
        bytesize::ByteSize::b(self.size).to_string()
    }
}
