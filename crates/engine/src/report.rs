//! Per-pass counters

use serde::Serialize;

/// What one reconciliation pass did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Keys examined across both sides
    pub synced: usize,
    pub noop: usize,
    pub recalibrate: usize,
    /// Actions suppressed by direction flags or incremental safety
    pub skipped: usize,
    pub errors: usize,
    pub create_caldav: usize,
    pub update_caldav: usize,
    pub delete_caldav: usize,
    pub create_notion: usize,
    pub update_notion: usize,
}

impl SyncReport {
    /// Writes that actually landed on either backend
    pub fn applied(&self) -> usize {
        self.create_caldav
            + self.update_caldav
            + self.delete_caldav
            + self.create_notion
            + self.update_notion
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "synced={} noop={} recalibrate={} skipped={} errors={} \
             create_caldav={} update_caldav={} delete_caldav={} \
             create_notion={} update_notion={}",
            self.synced,
            self.noop,
            self.recalibrate,
            self.skipped,
            self.errors,
            self.create_caldav,
            self.update_caldav,
            self.delete_caldav,
            self.create_notion,
            self.update_notion,
        )
    }
}
