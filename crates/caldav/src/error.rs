//! Error types for the CalDAV client

use thiserror::Error;

/// CalDAV transport and protocol errors
#[derive(Error, Debug)]
pub enum CalDavError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Conflict on {0} persisted after retry")]
    Conflict(String),
}

/// Result type alias for CalDAV operations
pub type CalDavResult<T> = Result<T, CalDavError>;
