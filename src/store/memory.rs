//! In-memory content store
//!
//! A content-addressed tree kept entirely in memory. Useful for tests and
//! for local tooling that wants to exercise the downloader without a
//! network. Faults can be injected per CID to reproduce failing size
//! queries, broken listings and streams that die mid-transfer.

use crate::error::{Result, StorageError};
use crate::store::{ContentReader, ContentStore, EntryIter};
use crate::types::{Cid, EntryKind, ResolvedNode, TreeEntry};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

const FILE_TAG: &[u8] = b"file\0";
const DIRECTORY_TAG: &[u8] = b"directory\0";

#[derive(Debug, Clone)]
enum StoredNode {
    File(Arc<Vec<u8>>),
    Directory(Vec<TreeEntry>),
}

#[derive(Debug, Clone, Default)]
struct Faults {
    resolve: bool,
    size: bool,
    list: bool,
    break_after: Option<u64>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    nodes: HashMap<Cid, StoredNode>,
    faults: HashMap<Cid, Faults>,
    list_calls: HashMap<Cid, usize>,
    open_calls: HashMap<Cid, usize>,
    read_delay: Option<Duration>,
    read_chunk: Option<usize>,
}

/// Content store backed by a hash map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a file and return its CID
    pub fn add_file(&self, content: impl Into<Vec<u8>>) -> Cid {
        let content = content.into();
        let mut tagged = Vec::with_capacity(FILE_TAG.len() + content.len());
        tagged.extend_from_slice(FILE_TAG);
        tagged.extend_from_slice(&content);
        let cid = Cid::for_content(&tagged);

        self.write()
            .nodes
            .insert(cid.clone(), StoredNode::File(Arc::new(content)));
        cid
    }

    /// Store a directory made of already-stored children and return its CID
    ///
    /// Entries keep the order they are given in. Every child must exist in
    /// the store and names must be unique within the directory.
    pub fn add_directory<I, S>(&self, children: I) -> Result<Cid>
    where
        I: IntoIterator<Item = (S, Cid)>,
        S: Into<String>,
    {
        let mut inner = self.write();
        let mut entries = Vec::new();
        let mut names = HashSet::new();
        let mut tagged = DIRECTORY_TAG.to_vec();

        for (name, cid) in children {
            let name = name.into();
            if !names.insert(name.clone()) {
                return Err(StorageError::invalid_parameter(
                    "children",
                    format!("duplicate entry name '{}'", name),
                ));
            }

            let (kind, size) = match inner.nodes.get(&cid) {
                Some(StoredNode::File(data)) => (EntryKind::File, data.len() as u64),
                Some(StoredNode::Directory(_)) => (EntryKind::Directory, 0),
                None => {
                    return Err(StorageError::invalid_parameter(
                        "children",
                        format!("entry '{}' refers to unknown CID {}", name, cid),
                    ))
                }
            };

            tagged.extend_from_slice(name.as_bytes());
            tagged.push(0);
            tagged.extend_from_slice(cid.as_str().as_bytes());
            tagged.push(b'\n');
            entries.push(TreeEntry::new(name, cid, kind, size));
        }

        let cid = Cid::for_content(&tagged);
        inner
            .nodes
            .insert(cid.clone(), StoredNode::Directory(entries));
        Ok(cid)
    }

    /// Make `resolve` fail for this CID
    pub fn fail_resolve(&self, cid: &Cid) {
        self.write().faults.entry(cid.clone()).or_default().resolve = true;
    }

    /// Make `size` fail for this CID
    pub fn fail_size(&self, cid: &Cid) {
        self.write().faults.entry(cid.clone()).or_default().size = true;
    }

    /// Make `list` fail for this CID
    pub fn fail_list(&self, cid: &Cid) {
        self.write().faults.entry(cid.clone()).or_default().list = true;
    }

    /// Make the content stream of this CID error after `bytes` bytes
    pub fn break_stream_after(&self, cid: &Cid, bytes: u64) {
        self.write().faults.entry(cid.clone()).or_default().break_after = Some(bytes);
    }

    /// Sleep this long inside every read call
    pub fn set_read_delay(&self, delay: Duration) {
        self.write().read_delay = Some(delay);
    }

    /// Return at most this many bytes per read call
    pub fn set_read_chunk(&self, chunk: usize) {
        self.write().read_chunk = Some(chunk.max(1));
    }

    /// How many times this directory has been listed
    pub fn list_count(&self, cid: &Cid) -> usize {
        self.read().list_calls.get(cid).copied().unwrap_or(0)
    }

    /// How many times this file has been opened
    pub fn open_count(&self, cid: &Cid) -> usize {
        self.read().open_calls.get(cid).copied().unwrap_or(0)
    }

    fn faults(&self, cid: &Cid) -> Faults {
        self.read().faults.get(cid).cloned().unwrap_or_default()
    }
}

impl ContentStore for MemoryStore {
    fn resolve(&self, cid: &Cid) -> Result<ResolvedNode> {
        if self.faults(cid).resolve {
            return Err(StorageError::resolution_error(
                cid.as_str(),
                "injected resolve failure",
            ));
        }

        match self.read().nodes.get(cid) {
            Some(StoredNode::File(_)) => Ok(ResolvedNode::new(cid.clone(), EntryKind::File)),
            Some(StoredNode::Directory(_)) => {
                Ok(ResolvedNode::new(cid.clone(), EntryKind::Directory))
            }
            None => Err(StorageError::resolution_error(
                cid.as_str(),
                "block not found",
            )),
        }
    }

    fn list(&self, node: &ResolvedNode) -> Result<EntryIter<'_>> {
        let cid = node.cid();
        let mut inner = self.write();
        *inner.list_calls.entry(cid.clone()).or_insert(0) += 1;

        if inner.faults.get(cid).is_some_and(|f| f.list) {
            return Err(StorageError::listing_error(
                cid.as_str(),
                "injected listing failure",
            ));
        }

        match inner.nodes.get(cid) {
            Some(StoredNode::Directory(entries)) => {
                let entries = entries.clone();
                Ok(Box::new(entries.into_iter().map(Ok)))
            }
            Some(StoredNode::File(_)) => Err(StorageError::listing_error(
                cid.as_str(),
                "node is a file, not a directory",
            )),
            None => Err(StorageError::listing_error(cid.as_str(), "block not found")),
        }
    }

    fn open(&self, node: &ResolvedNode) -> Result<ContentReader> {
        let cid = node.cid();
        let mut inner = self.write();
        *inner.open_calls.entry(cid.clone()).or_insert(0) += 1;

        let data = match inner.nodes.get(cid) {
            Some(StoredNode::File(data)) => data.clone(),
            Some(StoredNode::Directory(_)) => {
                return Err(StorageError::resolution_error(
                    cid.as_str(),
                    "node is a directory, not a file",
                ))
            }
            None => {
                return Err(StorageError::resolution_error(
                    cid.as_str(),
                    "block not found",
                ))
            }
        };

        Ok(Box::new(MemoryReader {
            data,
            position: 0,
            break_after: inner.faults.get(cid).and_then(|f| f.break_after),
            chunk: inner.read_chunk,
            delay: inner.read_delay,
        }))
    }

    fn size(&self, node: &ResolvedNode) -> Result<u64> {
        let cid = node.cid();
        if self.faults(cid).size {
            return Err(StorageError::resolution_error(
                cid.as_str(),
                "injected size failure",
            ));
        }

        match self.read().nodes.get(cid) {
            Some(StoredNode::File(data)) => Ok(data.len() as u64),
            Some(StoredNode::Directory(_)) => Err(StorageError::resolution_error(
                cid.as_str(),
                "node is a directory, not a file",
            )),
            None => Err(StorageError::resolution_error(
                cid.as_str(),
                "block not found",
            )),
        }
    }
}

struct MemoryReader {
    data: Arc<Vec<u8>>,
    position: usize,
    break_after: Option<u64>,
    chunk: Option<usize>,
    delay: Option<Duration>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut end = self.data.len();
        if let Some(limit) = self.break_after {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            if self.position >= limit && self.position < self.data.len() {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "stream reset by peer",
                ));
            }
            end = end.min(limit);
        }

        let mut n = (end - self.position).min(buf.len());
        if let Some(chunk) = self.chunk {
            n = n.min(chunk);
        }

        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}
