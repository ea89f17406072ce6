//! Content store boundary
//!
//! The downloader only needs five things from a content-addressed store:
//! resolve an identifier, classify the node, list a directory, open a file
//! as a byte stream and report a file's size. Everything behind those calls
//! (block exchange, gateways, repositories) belongs to the store.
//!
//! All methods are blocking. Callers run them on `spawn_blocking` threads.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Cid, EntryKind, ResolvedNode, TreeEntry};
use std::io::Read;

/// Lazy, finite directory listing. Not restartable; list again to re-read.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<TreeEntry>> + Send + 'a>;

/// Byte stream of a file's content
pub type ContentReader = Box<dyn Read + Send>;

/// Read access to a content-addressed file tree
pub trait ContentStore: Send + Sync {
    /// Resolve a content identifier to a classified node
    fn resolve(&self, cid: &Cid) -> Result<ResolvedNode>;

    /// File or directory
    fn classify(&self, node: &ResolvedNode) -> EntryKind {
        node.kind()
    }

    /// Enumerate the children of a directory node
    fn list(&self, node: &ResolvedNode) -> Result<EntryIter<'_>>;

    /// Open a file node for reading
    fn open(&self, node: &ResolvedNode) -> Result<ContentReader>;

    /// Size of a file node in bytes. An error means the size is unknown.
    fn size(&self, node: &ResolvedNode) -> Result<u64>;
}
