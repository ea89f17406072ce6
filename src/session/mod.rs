//! Session management
//!
//! This module provides the session handle every operation runs against,
//! its configuration and the per-call cancellation flag.

pub mod cancel;
pub mod config;
pub mod lifecycle;

pub use cancel::CancelFlag;
pub use config::{LogLevel, SessionConfig};
pub use lifecycle::StorageSession;
