//! Error types for the sync engine

use thiserror::Error;

/// Failures that abort a whole pass (per-item failures only count)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("calendar metadata missing; save settings with a calendar href first")]
    CalendarNotConfigured,

    #[error("a sync pass is already running")]
    Busy,

    #[error(transparent)]
    Core(#[from] notidav_core::SyncError),

    #[error(transparent)]
    CalDav(#[from] notidav_caldav::CalDavError),

    #[error(transparent)]
    Notion(#[from] notidav_notion::NotionError),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
