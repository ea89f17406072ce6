//! Selective downloads from a content-addressed file tree
//!
//! Pick files and directories inside a content tree by relative path,
//! download just those concurrently, and poll per-file and per-call progress
//! while the transfers run.
//!
//! ```rust,no_run
//! use storage_selective::{
//!     query_task, start_selective_download, MemoryStore, SessionConfig, StorageSession,
//! };
//!
//! # async fn run() -> storage_selective::Result<()> {
//! let store = MemoryStore::new();
//! let readme = store.add_file("hello");
//! let root = store.add_directory([("README.md", readme)])?;
//!
//! let session = StorageSession::new(store, SessionConfig::default())?;
//! session.start()?;
//!
//! let prefix = start_selective_download(&session, root.as_str(), "/tmp/out", ["README.md"]).await?;
//! let summary = query_task(&session, &prefix)?;
//! println!("{}", summary.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;

pub mod download;
pub mod progress;
pub mod selection;
pub mod session;
pub mod storage;
pub mod store;

pub use download::{
    cancel_download, download_file, query_progress, query_task, start_selective_download,
    CountingSink, FileDownloadResult, FileDownloadTask, TreeWalker,
};

pub use error::{Result, StorageError};

pub use progress::{
    task_id, ProgressInfo, ProgressLedger, ProgressRecord, TaskState, TaskSummary, TransferState,
    WalkReport,
};

pub use selection::{classify, normalize_path, Selection, SelectionSet};

pub use session::{CancelFlag, LogLevel, SessionConfig, StorageSession};

pub use storage::{fetch, list_directory, node_info};

pub use store::{ContentStore, MemoryStore};

pub use types::{Cid, CidError, EntryKind, NodeInfo, ResolvedNode, TreeEntry};
