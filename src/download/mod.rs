//! Selective downloads
//!
//! This module materializes a chosen subset of a content tree on the local
//! filesystem. A tree walk decides what is selected, every selected file is
//! transferred concurrently by a bounded worker pool, and each transfer
//! publishes its progress to the session's ledger.

pub mod file;
pub mod operations;
pub mod sink;
pub mod types;
pub mod walker;

pub use file::FileDownloadTask;
pub use operations::{
    cancel_download, download_file, query_progress, query_task, start_selective_download,
};
pub use sink::{copy_stream, CountingSink};
pub use types::FileDownloadResult;
pub use walker::{TreeWalker, WalkOutcome, WalkScope};
