//! Error types for the Notion client

use thiserror::Error;

/// Notion transport and API errors
#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

/// Result type alias for Notion operations
pub type NotionResult<T> = Result<T, NotionError>;
