//! notidav engine - Reconciliation between Notion tasks and CalDAV events
//!
//! One pass gathers both sides, decides a per-item action from the stored
//! mapping state, applies it through the injected clients, and commits the
//! sync cursors. Webhook-targeted reconciliation and the authoritative
//! calendar rewrite live here too.

pub mod decide;
pub mod error;
pub mod gate;
pub mod report;
pub mod sync;

pub use decide::{decide, SyncAction, SyncDecision};
pub use error::EngineError;
pub use gate::SyncGate;
pub use report::SyncReport;
pub use sync::{full_sync_due, SyncEngine, SyncOptions};
