//! In-flight gate for sync passes
//!
//! Concurrent passes are disallowed: the scheduler checks here before a
//! periodic run, and the webhook full-sync kickoff honors the same gate.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One-pass-at-a-time guard shared across triggers
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    inner: Arc<Mutex<()>>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` when a pass is already running
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.inner).try_lock_owned().ok()
    }

    /// Whether a pass currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
