//! Single file transfer
//!
//! A [`FileDownloadTask`] moves one file from the content store to disk and
//! reports every step in its own progress record. Its failures end up in
//! that record and nowhere else; siblings never see them.

use crate::download::sink::{copy_stream, CountingSink};
use crate::error::{Result, StorageError};
use crate::progress::{ProgressLedger, ProgressRecord, RecordHandle};
use crate::session::CancelFlag;
use crate::store::ContentStore;
use crate::types::Cid;
use bytesize::ByteSize;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One file download, registered and ready to run
pub struct FileDownloadTask {
    store: Arc<dyn ContentStore>,
    cid: Cid,
    local_path: PathBuf,
    record: RecordHandle,
    buffer_size: usize,
    cancel: CancelFlag,
}

impl FileDownloadTask {
    /// Register a pending record for the file under `task_id`
    ///
    /// Registering an id that already exists resets its record.
    pub fn register(
        ledger: &ProgressLedger,
        store: Arc<dyn ContentStore>,
        cid: Cid,
        local_path: impl AsRef<Path>,
        task_id: &str,
    ) -> Self {
        let local_path = local_path.as_ref().to_path_buf();
        let record = ledger.register(ProgressRecord::new(task_id, cid.as_str(), &local_path));

        Self {
            store,
            cid,
            local_path,
            record,
            buffer_size: crate::session::config::DEFAULT_COPY_BUFFER_SIZE,
            cancel: CancelFlag::new(),
        }
    }

    /// Set the copy buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Observe a cancellation flag while running
    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn task_id(&self) -> &str {
        self.record.id()
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Handle to the record this task reports into
    pub fn record(&self) -> &RecordHandle {
        &self.record
    }

    /// Mark the task failed without running it
    pub fn abandon(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.record.mutate(|record| record.fail(reason.clone())) {
            debug!("Download {} abandoned: {}", self.task_id(), reason);
        }
    }

    /// Run the transfer to completion. Blocking.
    ///
    /// Returns the number of bytes written. Whatever the outcome, the
    /// record ends in `Completed` or `Failed`.
    pub fn run(self) -> Result<u64> {
        match self.transfer() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                let message = e.to_string();
                if self.record.mutate(|record| record.fail(message.clone())) {
                    warn!("Download {} failed: {}", self.task_id(), message);
                }
                Err(e)
            }
        }
    }

    fn transfer(&self) -> Result<u64> {
        self.cancel.check("download")?;
        self.record.mutate(|record| record.begin_sizing());

        let node = self.store.resolve(&self.cid)?;
        if self.store.classify(&node).is_directory() {
            return Err(StorageError::resolution_error(
                self.cid.as_str(),
                "node is a directory, not a file",
            ));
        }

        match self.store.size(&node) {
            Ok(size) => {
                self.record.mutate(|record| record.set_total_bytes(size));
            }
            Err(e) => {
                warn!(
                    "Could not determine size of {} ({}), continuing without a total",
                    self.cid, e
                );
            }
        }

        if let Some(parent) = self.local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        self.cancel.check("download")?;
        let mut reader = self.store.open(&node)?;
        let file = File::create(&self.local_path)?;

        self.record.mutate(|record| record.begin_transfer());
        let mut sink = CountingSink::new(file, self.record.clone());

        let copied = copy_stream(&mut reader, &mut sink, self.buffer_size, &self.cancel);
        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(sink);
                self.remove_partial_file();
                if self.cancel.is_cancelled() {
                    return Err(StorageError::cancelled("download"));
                }
                return Err(StorageError::copy_error(
                    self.local_path.display().to_string(),
                    e.to_string(),
                ));
            }
        };

        let reported = self.record.mutate(|record| {
            let reported = record.total_bytes;
            record.complete(bytes);
            reported
        });

        if let Some(reported) = reported {
            if reported != bytes {
                warn!(
                    "Size mismatch for {}: store reported {} bytes, wrote {} bytes",
                    self.task_id(),
                    reported,
                    bytes
                );
            }
        }

        info!(
            "Downloaded {} ({}) to {}",
            self.task_id(),
            ByteSize::b(bytes),
            self.local_path.display()
        );
        Ok(bytes)
    }

    fn remove_partial_file(&self) {
        if let Err(e) = fs::remove_file(&self.local_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove partial file {}: {}",
                    self.local_path.display(),
                    e
                );
            }
        }
    }
}
