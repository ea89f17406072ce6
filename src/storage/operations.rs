//! Content inspection operations
//!
//! Thin call-throughs to the content store that every other part of the
//! crate builds on. Store calls block, so each one runs on a blocking
//! thread, bounded by the session's resolve or list timeout where the
//! caller is waiting on a remote answer.

use crate::error::{Result, StorageError};
use crate::session::StorageSession;
use crate::types::{Cid, EntryKind, NodeInfo, ResolvedNode, TreeEntry};
use log::{debug, warn};
use std::future::Future;
use std::io::Read;
use std::time::Duration;

/// Await a blocking store call, giving up after `limit`
///
/// The blocking thread is not interrupted; its answer is dropped.
async fn with_timeout<T, F>(limit: Duration, operation: String, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<Result<T>, tokio::task::JoinError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(joined) => joined?,
        Err(_) => Err(StorageError::timeout(operation)),
    }
}

/// Resolve a CID within the session's resolve timeout
pub(crate) async fn resolve_node(session: &StorageSession, cid: &Cid) -> Result<ResolvedNode> {
    let store = session.store().clone();
    let target = cid.clone();

    with_timeout(
        session.config().effective_resolve_timeout(),
        format!("resolve {}", cid),
        tokio::task::spawn_blocking(move || store.resolve(&target)),
    )
    .await
}

/// Read a whole directory listing within the session's list timeout
pub(crate) async fn list_node(
    session: &StorageSession,
    node: &ResolvedNode,
) -> Result<Vec<TreeEntry>> {
    let store = session.store().clone();
    let target = node.clone();

    with_timeout(
        session.config().effective_list_timeout(),
        format!("list {}", node.cid()),
        tokio::task::spawn_blocking(move || store.list(&target)?.collect::<Result<Vec<_>>>()),
    )
    .await
}

fn parse_cid(cid: &str) -> Result<Cid> {
    if cid.is_empty() {
        return Err(StorageError::invalid_parameter(
            "cid",
            "CID cannot be empty",
        ));
    }
    Ok(cid.parse()?)
}

/// List the entries of a directory
///
/// # Arguments
///
/// * `session` - The started session to use
/// * `cid` - The content ID of the directory
///
/// # Returns
///
/// The directory's entries, one level deep, in store order
pub async fn list_directory(session: &StorageSession, cid: &str) -> Result<Vec<TreeEntry>> {
    session.ensure_started("list_directory")?;
    let cid = parse_cid(cid)?;

    let node = resolve_node(session, &cid).await?;
    if session.store().classify(&node) != EntryKind::Directory {
        return Err(StorageError::listing_error(
            cid.as_str(),
            "node is a file, not a directory",
        ));
    }

    let entries = list_node(session, &node).await?;
    debug!("Listed {} entries of {}", entries.len(), cid);
    Ok(entries)
}

/// Describe a node without failing
///
/// Problems resolving, sizing or listing the node are reported in
/// [`NodeInfo::error`]; whatever could be learned is still filled in.
pub async fn node_info(session: &StorageSession, cid: &str) -> NodeInfo {
    let info = NodeInfo::new(cid);

    if let Err(e) = session.ensure_started("node_info") {
        return info.with_error(e.to_string());
    }

    let parsed = match parse_cid(cid) {
        Ok(parsed) => parsed,
        Err(e) => return info.with_error(e.to_string()),
    };

    let node = match resolve_node(session, &parsed).await {
        Ok(node) => node,
        Err(e) => return info.with_error(e.to_string()),
    };

    let mut info = info;
    let kind = session.store().classify(&node);
    info.kind = Some(kind);

    match kind {
        EntryKind::File => {
            let store = session.store().clone();
            let target = node.clone();
            let size = with_timeout(
                session.config().effective_resolve_timeout(),
                format!("size {}", parsed),
                tokio::task::spawn_blocking(move || store.size(&target)),
            )
            .await;

            match size {
                Ok(size) => info.size = Some(size),
                Err(e) => {
                    warn!("Could not determine size of {}: {}", parsed, e);
                    info.error = Some(format!("failed to get file size: {}", e));
                }
            }
        }
        EntryKind::Directory => match list_node(session, &node).await {
            Ok(entries) => info.entries = Some(entries),
            Err(e) => info.error = Some(e.to_string()),
        },
    }

    info
}

/// Fetch a whole file into memory
///
/// # Arguments
///
/// * `session` - The started session to use
/// * `cid` - The content ID of the file
///
/// # Returns
///
/// The file's bytes
pub async fn fetch(session: &StorageSession, cid: &str) -> Result<Vec<u8>> {
    session.ensure_started("fetch")?;
    let cid = parse_cid(cid)?;

    let node = resolve_node(session, &cid).await?;
    if session.store().classify(&node).is_directory() {
        return Err(StorageError::invalid_parameter(
            "cid",
            format!("{} is a directory, not a file", cid),
        ));
    }

    let store = session.store().clone();
    tokio::task::spawn_blocking(move || {
        let mut reader = store.open(&node)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    })
    .await?
}
