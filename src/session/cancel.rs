//! Cancellation signal shared by one orchestration call

use crate::error::{Result, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One-way flag; once tripped it stays tripped
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is tripped
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(StorageError::cancelled(operation))
        } else {
            Ok(())
        }
    }
}

/// Flags of the calls a session is running, keyed by task prefix
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelRegistry(Arc<Mutex<HashMap<String, CancelFlag>>>);

impl CancelRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancelFlag>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New flag under `key`. When `active` says the owner is shut down, the
    /// flag comes back already tripped and is not kept.
    pub(crate) fn register(&self, key: &str, active: impl FnOnce() -> bool) -> CancelFlag {
        let flag = CancelFlag::new();
        let mut flags = self.lock();
        if active() {
            flags.insert(key.to_string(), flag.clone());
        } else {
            flag.cancel();
        }
        flag
    }

    pub(crate) fn release(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Trip and forget the flag under `key`
    pub(crate) fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Trip and forget every flag, returning how many there were
    pub(crate) fn cancel_all(&self) -> usize {
        let mut flags = self.lock();
        for flag in flags.values() {
            flag.cancel();
        }
        let count = flags.len();
        flags.clear();
        count
    }
}
