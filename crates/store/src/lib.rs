//! notidav store - Persistent sync state
//!
//! Everything the engine remembers between passes lives behind the
//! [`KeyValueStore`] substrate trait: calendar settings (one key per
//! field), mapping records linking a Notion page to a CalDAV event, the
//! lookup indices for both directions, and the sync-token cursors.

pub mod json_file;
pub mod kv;
pub mod settings;
pub mod state;

pub use json_file::JsonFileStore;
pub use kv::{KeyValueStore, MemoryStore, StoreError};
pub use settings::Settings;
pub use state::{MappingRecord, StateStore};
