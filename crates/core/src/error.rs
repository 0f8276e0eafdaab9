//! Error types for notidav core domain logic

use thiserror::Error;

/// Core domain errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid iCalendar payload: {0}")]
    InvalidIcs(String),

    #[error("Invalid date value: {0}")]
    InvalidDate(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Result type alias for core operations
pub type SyncResult<T> = Result<T, SyncError>;
