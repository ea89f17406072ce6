//! Session lifecycle management
//!
//! A [`StorageSession`] owns everything a download needs: the content store,
//! the progress ledger, the worker pool and the cancellation flags of the
//! downloads it started. Operations take the session explicitly; there is no
//! process-wide state.

use crate::error::{Result, StorageError};
use crate::progress::ProgressLedger;
use crate::session::cancel::{CancelFlag, CancelRegistry};
use crate::session::config::{LogLevel, SessionConfig};
use crate::store::ContentStore;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

struct SessionInner {
    store: Arc<dyn ContentStore>,
    config: SessionConfig,
    ledger: Arc<ProgressLedger>,
    workers: Arc<Semaphore>,
    started: AtomicBool,
    cancellations: CancelRegistry,
    last_prefix_nanos: AtomicI64,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // In-flight work holds its own handles; make sure it winds down
        self.cancellations.cancel_all();
    }
}

/// Handle to a content store session
///
/// Cloning is cheap and every clone refers to the same session.
#[derive(Clone)]
pub struct StorageSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSession")
            .field("config", &self.inner.config)
            .field("started", &self.is_started())
            .field("records", &self.inner.ledger.len())
            .finish()
    }
}

impl StorageSession {
    /// Create a new session over a content store
    ///
    /// The session is not started automatically; call `start()` before
    /// downloading.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use storage_selective::{MemoryStore, SessionConfig, StorageSession};
    ///
    /// let session = StorageSession::new(MemoryStore::new(), SessionConfig::default())?;
    /// session.start()?;
    /// assert!(session.is_started());
    /// session.stop()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new<S: ContentStore + 'static>(store: S, config: SessionConfig) -> Result<Self> {
        Self::with_store(Arc::new(store), config)
    }

    /// Create a new session over a shared content store
    pub fn with_store(store: Arc<dyn ContentStore>, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let workers = Arc::new(Semaphore::new(config.effective_max_concurrent_downloads()));

        Ok(Self {
            inner: Arc::new(SessionInner {
                store,
                config,
                ledger: Arc::new(ProgressLedger::new()),
                workers,
                started: AtomicBool::new(false),
                cancellations: CancelRegistry::default(),
                last_prefix_nanos: AtomicI64::new(0),
            }),
        })
    }

    /// Start the session
    pub fn start(&self) -> Result<()> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StorageError::session_error(
                "start",
                "Session is already started",
            ));
        }

        if let Some(level) = self.inner.config.log_level {
            log::set_max_level(level.to_level_filter());
        }

        info!(
            "Storage session started ({} concurrent downloads)",
            self.inner.config.effective_max_concurrent_downloads()
        );
        Ok(())
    }

    /// Stop the session, cancelling every download it started
    ///
    /// Records already in the ledger stay queryable. The session can be
    /// started again afterwards.
    pub fn stop(&self) -> Result<()> {
        if self
            .inner
            .started
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StorageError::session_error("stop", "Session is not started"));
        }

        let cancelled = self.inner.cancellations.cancel_all();
        info!(
            "Storage session stopped, cancelled {} running download(s)",
            cancelled
        );
        Ok(())
    }

    /// Check if the session is started
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Change the log level at runtime
    pub fn update_log_level(&self, level: LogLevel) {
        log::set_max_level(level.to_level_filter());
        debug!("Log level set to {}", level);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The progress ledger shared by every download of this session
    pub fn ledger(&self) -> &Arc<ProgressLedger> {
        &self.inner.ledger
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.inner.store
    }

    pub(crate) fn workers(&self) -> &Arc<Semaphore> {
        &self.inner.workers
    }

    pub(crate) fn ensure_started(&self, operation: &str) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(StorageError::session_error(operation, "Session is not started"))
        }
    }

    /// A task prefix no earlier call on this session has returned
    ///
    /// Based on the wall clock in nanoseconds, bumped past the previous value
    /// when two calls land on the same tick.
    pub(crate) fn next_task_prefix(&self) -> String {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let previous = self
            .inner
            .last_prefix_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        let value = now.max(previous.saturating_add(1));

        format!("{}_{}", self.inner.config.effective_task_prefix(), value)
    }

    /// Cancellation flag for a new orchestration call
    ///
    /// Checked against the started state under the registry lock, so a
    /// concurrent `stop()` cannot miss the flag.
    pub(crate) fn register_cancellation(&self, prefix: &str) -> CancelFlag {
        self.inner
            .cancellations
            .register(prefix, || self.is_started())
    }

    pub(crate) fn release_cancellation(&self, prefix: &str) {
        self.inner.cancellations.release(prefix);
    }

    /// Registry handle for work that outlives the calling operation
    pub(crate) fn cancellations(&self) -> CancelRegistry {
        self.inner.cancellations.clone()
    }

    /// Trip the cancellation flag of one running orchestration call.
    /// Returns false when nothing under `prefix` is running.
    pub fn cancel(&self, prefix: &str) -> bool {
        let cancelled = self.inner.cancellations.cancel(prefix);
        if cancelled {
            info!("Download task {} cancelled", prefix);
        }
        cancelled
    }
}
