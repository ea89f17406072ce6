//! Type-safe wrappers for common storage types

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Content Identifier (CID)
///
/// CIDs uniquely identify a node (file or directory) in a content store.
/// They use a multibase `z` prefix followed by base32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cid(String);

impl Cid {
    /// Creates a new CID from a string without validation
    ///
    /// This method does not validate the CID format. Use `from_str()` for
    /// validated CID creation.
    pub fn new(cid: String) -> Self {
        Self(cid)
    }

    /// Derives a CID from raw bytes by hashing them with SHA-256
    pub fn for_content(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("z{}", BASE32_NOPAD.encode(&digest).to_lowercase()))
    }

    /// Returns the CID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if !s.starts_with('z') {
            return Err(CidError::InvalidFormat("CID must start with 'z'".into()));
        }

        if s.len() < 2 {
            return Err(CidError::InvalidFormat("CID is too short".into()));
        }

        // Lenient on case, strict on alphabet
        let base32_chars = &s[1..];
        if !base32_chars
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '2'..='7' | '='))
        {
            return Err(CidError::InvalidEncoding("Invalid base32 encoding".into()));
        }

        Ok(Cid(s.to_string()))
    }
}

impl Display for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Cid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

/// Kind of a node in a content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// One child of a directory as reported by the content store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name within its parent directory
    pub name: String,
    /// Content ID of the entry itself
    pub cid: Cid,
    /// File or directory
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes as advertised by the listing (files)
    pub size: u64,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, cid: Cid, kind: EntryKind, size: u64) -> Self {
        Self {
            name: name.into(),
            cid,
            kind,
            size,
        }
    }
}

/// A content identifier the store has resolved and classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    cid: Cid,
    kind: EntryKind,
}

impl ResolvedNode {
    pub fn new(cid: Cid, kind: EntryKind) -> Self {
        Self { cid, kind }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }
}

/// Summary of a single node, as returned by `node_info`
///
/// Inspection never fails outright; problems are reported in `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The CID that was inspected
    pub cid: String,
    /// File or directory; `None` when the node could not be classified
    #[serde(rename = "type")]
    pub kind: Option<EntryKind>,
    /// File size, when known
    pub size: Option<u64>,
    /// Directory entries, when listing succeeded
    pub entries: Option<Vec<TreeEntry>>,
    /// Resolution, size or listing error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeInfo {
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// Error types

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CidError {
    InvalidFormat(String),
    InvalidEncoding(String),
}

impl fmt::Display for CidError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CidError::InvalidFormat(msg) => write!(f, "Invalid CID format: {}", msg),
            CidError::InvalidEncoding(msg) => write!(f, "Invalid CID encoding: {}", msg),
        }
    }
}

impl std::error::Error for CidError {}
