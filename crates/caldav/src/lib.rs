//! notidav caldav - CalDAV delta client
//!
//! Speaks PUT/DELETE/PROPFIND/REPORT/PROPPATCH against a calendar
//! collection over an authenticated HTTP transport, including the
//! RFC 6578 `sync-collection` delta path with its full-listing fallback.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod xml;

pub use client::{
    normalize_calendar_color, CalDavClient, DeltaOutcome, EventDelta, EventRef, RemoteEvent,
};
pub use config::CalDavConfig;
pub use error::CalDavError;
