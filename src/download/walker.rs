//! Recursive tree walk
//!
//! The walker lists directories, decides per entry whether it matters to
//! the selection and hands every selected file to the worker pool. It runs
//! on a blocking thread; file transfers are spawned onto the runtime and run
//! concurrently with the rest of the walk.

use crate::download::file::FileDownloadTask;
use crate::error::{Result, StorageError};
use crate::progress::{task_id, ProgressLedger, RecordHandle, WalkReport};
use crate::selection::{is_safe_entry_name, join_relative, SelectionSet, ROOT};
use crate::session::CancelFlag;
use crate::store::ContentStore;
use crate::types::{Cid, EntryKind, ResolvedNode};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What one walk needs from the session that started it
#[derive(Clone)]
pub struct WalkScope {
    pub store: Arc<dyn ContentStore>,
    pub ledger: Arc<ProgressLedger>,
    pub workers: Arc<Semaphore>,
    pub runtime: Handle,
    pub cancel: CancelFlag,
    pub buffer_size: usize,
    pub prefix: String,
}

/// Result of a finished walk
pub struct WalkOutcome {
    pub report: WalkReport,
    /// One handle per scheduled file, resolving once its record is terminal
    pub transfers: Vec<JoinHandle<Result<u64>>>,
    /// Error listing the root, or cancellation
    pub result: Result<()>,
}

/// Walks one content tree for one orchestration call
pub struct TreeWalker {
    scope: WalkScope,
    selection: Arc<SelectionSet>,
    matched: HashSet<String>,
    report: WalkReport,
    transfers: Vec<JoinHandle<Result<u64>>>,
}

impl TreeWalker {
    pub fn new(scope: WalkScope, selection: Arc<SelectionSet>) -> Self {
        Self {
            scope,
            selection,
            matched: HashSet::new(),
            report: WalkReport::default(),
            transfers: Vec::new(),
        }
    }

    /// Walk the tree below `root` into `local_base`. Blocking.
    ///
    /// Failures below the root are logged and recorded in the report; only
    /// a failure to list the root itself, or cancellation, ends up in
    /// [`WalkOutcome::result`].
    pub fn walk(mut self, root: &ResolvedNode, local_base: &Path) -> WalkOutcome {
        info!(
            "Walking {} for {} ({} selected paths)",
            root.cid(),
            self.scope.prefix,
            self.selection.len()
        );

        let root_selection = self.selection.classify(ROOT, true);
        if root_selection.selected {
            self.matched.insert(ROOT.to_string());
        }

        let result = self.walk_directory(root, local_base, ROOT, root_selection.selected);

        let mut unmatched: Vec<String> = self
            .selection
            .iter()
            .filter(|path| !self.matched.contains(*path))
            .map(str::to_string)
            .collect();
        unmatched.sort();
        for path in &unmatched {
            debug!("Selected path {} was not found in {}", path, root.cid());
        }
        self.report.unmatched_selections = unmatched;

        info!(
            "Walk for {} finished: {} directories, {} files scheduled",
            self.scope.prefix, self.report.directories_walked, self.report.files_scheduled
        );

        WalkOutcome {
            report: self.report,
            transfers: self.transfers,
            result,
        }
    }

    fn walk_directory(
        &mut self,
        node: &ResolvedNode,
        local_dir: &Path,
        relative_dir: &str,
        parent_selected: bool,
    ) -> Result<()> {
        self.scope.cancel.check("walk")?;

        let store = self.scope.store.clone();
        let entries = store.list(node)?;
        fs::create_dir_all(local_dir)?;
        self.report.directories_walked += 1;

        for entry in entries {
            self.scope.cancel.check("walk")?;
            let entry = entry?;

            if !is_safe_entry_name(&entry.name) {
                warn!(
                    "Skipping entry with unsafe name {:?} in {}",
                    entry.name, relative_dir
                );
                self.report.entries_skipped += 1;
                continue;
            }

            let relative = join_relative(relative_dir, &entry.name);
            let local = local_dir.join(&entry.name);
            let is_directory = entry.kind.is_directory();
            let selection = self.selection.classify(&relative, is_directory);
            if selection.selected {
                self.matched.insert(relative.clone());
            }
            let wanted = parent_selected || selection.selected;

            if is_directory {
                if !wanted && !selection.has_selected_descendant {
                    continue;
                }

                let child = ResolvedNode::new(entry.cid, EntryKind::Directory);
                if let Err(e) = self.walk_directory(&child, &local, &relative, wanted) {
                    if self.scope.cancel.is_cancelled() {
                        return Err(e);
                    }
                    error!("Failed to walk {} ({}): {}", relative, child.cid(), e);
                    self.report.listing_failures.push(relative);
                }
            } else if wanted {
                self.schedule(entry.cid, &local, &relative);
            }
        }

        Ok(())
    }

    fn schedule(&mut self, cid: Cid, local_path: &Path, relative: &str) {
        let id = task_id(&self.scope.prefix, relative);
        let task = FileDownloadTask::register(
            &self.scope.ledger,
            self.scope.store.clone(),
            cid,
            local_path,
            &id,
        )
        .buffer_size(self.scope.buffer_size)
        .cancel_flag(self.scope.cancel.clone());

        debug!("Scheduled {} -> {}", id, local_path.display());
        self.report.files_scheduled += 1;

        let workers = self.scope.workers.clone();
        let handle = self.scope.runtime.spawn(run_transfer(workers, task));
        self.transfers.push(handle);
    }
}

/// Wait for a worker slot, then run the transfer on a blocking thread
///
/// The record ends in a terminal state whatever happens here.
pub(crate) async fn run_transfer(workers: Arc<Semaphore>, task: FileDownloadTask) -> Result<u64> {
    let record: RecordHandle = task.record().clone();

    let permit = match workers.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            task.abandon("worker pool closed");
            return Err(StorageError::session_error("download", "worker pool closed"));
        }
    };

    let joined = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        task.run()
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => {
            let message = format!("download task aborted: {}", e);
            error!("{} for {}", message, record.id());
            record.mutate(|r| r.fail(message));
            Err(StorageError::from(e))
        }
    }
}
