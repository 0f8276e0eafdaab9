//! notidav notion - Doc-store client
//!
//! JSON-over-HTTPS client for the Notion API: data-source discovery,
//! incremental page queries, page parsing into the neutral task model,
//! and typed property writes resolved against the target schema.

pub mod client;
pub mod config;
pub mod error;
pub mod parse;
pub mod props;

pub use client::{DataSource, NotionClient};
pub use config::NotionConfig;
pub use error::NotionError;
pub use parse::parse_page;
pub use props::{is_task_schema, resolve_property_names, ResolvedProperties};
