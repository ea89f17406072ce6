//! Content inspection
//!
//! Read-only operations against the session's content store.
//!
//! ## Core Functions
//!
//! - [`list_directory()`] - List the entries of a directory
//! - [`node_info()`] - Describe a node, reporting problems instead of failing
//! - [`fetch()`] - Read a whole file into memory

pub mod operations;

pub use operations::{fetch, list_directory, node_info};
