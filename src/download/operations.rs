//! Download operations
//!
//! Every call returns quickly or awaits exactly the work it names. Progress
//! of anything started here is read back through the session's ledger with
//! [`query_progress`] and [`query_task`].

use crate::download::file::FileDownloadTask;
use crate::download::types::FileDownloadResult;
use crate::download::walker::{run_transfer, TreeWalker, WalkScope};
use crate::error::{Result, StorageError};
use crate::progress::{ProgressInfo, TaskRecord, TaskState, TaskSummary};
use crate::selection::SelectionSet;
use crate::session::StorageSession;
use crate::storage::operations::resolve_node;
use crate::types::Cid;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

fn parse_cid(parameter: &str, cid: &str) -> Result<Cid> {
    if cid.is_empty() {
        return Err(StorageError::invalid_parameter(
            parameter,
            "CID cannot be empty",
        ));
    }
    Ok(cid.parse()?)
}

fn check_local_path(parameter: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(StorageError::invalid_parameter(
            parameter,
            "Local path cannot be empty",
        ));
    }
    Ok(())
}

/// Start downloading the selected parts of a content tree
///
/// Validates the request, makes sure the root resolves to a directory and
/// returns the task prefix without waiting for any transfer. The walk and
/// every file transfer run in the background; poll them with
/// [`query_task`] and [`query_progress`].
///
/// # Arguments
///
/// * `session` - The started session to use
/// * `root_cid` - The content ID of the root directory
/// * `local_base` - Directory the selected tree is materialized into
/// * `selection` - Relative paths to download; a selected directory brings
///   everything below it, `.` selects the whole tree
///
/// # Returns
///
/// The task prefix scoping this call's ledger entries
///
/// # Errors
///
/// Returns an error if:
/// - The session is not started
/// - The CID or local path is empty or malformed
/// - The selection is empty
/// - The root cannot be resolved or is not a directory
pub async fn start_selective_download<I, S>(
    session: &StorageSession,
    root_cid: &str,
    local_base: impl AsRef<Path>,
    selection: I,
) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    session.ensure_started("start_selective_download")?;

    let root_cid = parse_cid("root_cid", root_cid)?;
    let local_base = local_base.as_ref().to_path_buf();
    check_local_path("local_base", &local_base)?;

    let selection = SelectionSet::from_paths(selection);
    if selection.is_empty() {
        return Err(StorageError::invalid_parameter(
            "selection",
            "Selection cannot be empty",
        ));
    }

    let root = resolve_node(session, &root_cid).await?;
    if !session.store().classify(&root).is_directory() {
        return Err(StorageError::invalid_parameter(
            "root_cid",
            format!("{} is not a directory", root_cid),
        ));
    }

    let prefix = session.next_task_prefix();
    let task = session.ledger().register_task(TaskRecord::new(
        &prefix,
        root_cid.as_str(),
        &local_base,
    ));
    let cancel = session.register_cancellation(&prefix);
    let registry = session.cancellations();

    info!(
        "Starting selective download {} of {} into {}",
        prefix,
        root_cid,
        local_base.display()
    );

    let scope = WalkScope {
        store: session.store().clone(),
        ledger: session.ledger().clone(),
        workers: session.workers().clone(),
        runtime: Handle::current(),
        cancel: cancel.clone(),
        buffer_size: session.config().effective_copy_buffer_size(),
        prefix: prefix.clone(),
    };
    let walker = TreeWalker::new(scope, Arc::new(selection));
    let unit_prefix = prefix.clone();

    tokio::spawn(async move {
        let prefix = unit_prefix;
        let walked =
            tokio::task::spawn_blocking(move || walker.walk(&root, &local_base)).await;

        let outcome = match walked {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Walk for {} aborted: {}", prefix, e);
                registry.release(&prefix);
                task.mutate(|t| {
                    t.finish(
                        TaskState::WalkFailed,
                        Some(format!("walk aborted: {}", e)),
                    )
                });
                return;
            }
        };

        let files = outcome.transfers.len();
        task.mutate(|t| t.finish_walk(outcome.report));

        // File outcomes live in their own records
        for transfer in outcome.transfers {
            if let Err(e) = transfer.await {
                warn!("Transfer unit for {} ended abnormally: {}", prefix, e);
            }
        }

        let (state, message) = match outcome.result {
            _ if cancel.is_cancelled() => (TaskState::Cancelled, None),
            Ok(()) => (TaskState::Done, None),
            Err(StorageError::Cancelled { .. }) => (TaskState::Cancelled, None),
            Err(e) => {
                error!("Walk for {} failed: {}", prefix, e);
                (TaskState::WalkFailed, Some(e.to_string()))
            }
        };

        // Released before the terminal state is visible to pollers
        registry.release(&prefix);
        task.mutate(|t| t.finish(state, message));
        info!(
            "Selective download {} finished as {} ({} files)",
            prefix, state, files
        );
    });

    Ok(prefix)
}

/// Download a single file and wait for it
///
/// Progress is published under `task_id` while the transfer runs, and the
/// transfer can be stopped with [`cancel_download`] using the same id.
///
/// # Arguments
///
/// * `session` - The started session to use
/// * `cid` - The content ID of the file
/// * `local_path` - Where the file is written; parent directories are created
/// * `task_id` - Ledger key for the transfer's progress
///
/// # Returns
///
/// A `FileDownloadResult` with the bytes written and the time taken
pub async fn download_file(
    session: &StorageSession,
    cid: &str,
    local_path: impl AsRef<Path>,
    task_id: &str,
) -> Result<FileDownloadResult> {
    session.ensure_started("download_file")?;

    let cid = parse_cid("cid", cid)?;
    let local_path = local_path.as_ref().to_path_buf();
    check_local_path("local_path", &local_path)?;
    if task_id.is_empty() {
        return Err(StorageError::invalid_parameter(
            "task_id",
            "Task ID cannot be empty",
        ));
    }

    let start_time = Instant::now();
    let cancel = session.register_cancellation(task_id);
    let task = FileDownloadTask::register(
        session.ledger(),
        session.store().clone(),
        cid.clone(),
        &local_path,
        task_id,
    )
    .buffer_size(session.config().effective_copy_buffer_size())
    .cancel_flag(cancel);

    let result = run_transfer(session.workers().clone(), task).await;
    session.release_cancellation(task_id);
    let bytes = result?;

    Ok(
        FileDownloadResult::new(task_id, cid.as_str(), bytes, &local_path)
            .duration_ms(start_time.elapsed().as_millis() as u64),
    )
}

/// Cancel a running selective download or single-file download
///
/// Transfers already running abort at their next read and remove their
/// partial file; transfers still waiting for a worker fail without starting.
pub fn cancel_download(session: &StorageSession, prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(StorageError::invalid_parameter(
            "prefix",
            "Task prefix cannot be empty",
        ));
    }

    if session.cancel(prefix) {
        Ok(())
    } else {
        Err(StorageError::not_found(prefix))
    }
}

/// Progress of one file download
pub fn query_progress(session: &StorageSession, task_id: &str) -> Result<ProgressInfo> {
    session.ledger().query(task_id)
}

/// Progress of a whole selective download
pub fn query_task(session: &StorageSession, prefix: &str) -> Result<TaskSummary> {
    session.ledger().summarize(prefix)
}
