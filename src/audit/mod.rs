//! Append-only audit trail
//!
//! Every create, update and (soft) delete that goes through [`crate::storage::Storage`]
//! is recorded as one JSON line with before/after snapshots. This log is
//! separate from the `tracing` diagnostics and is always written.
//!
//! - `AuditEntry`: one operation on one entity.
//! - `AuditLogger`: appends entries to the JSONL file and reads them back.
//! - `generate_diff`: top-level field changes between two snapshots.

mod diff;
mod entry;
mod logger;

pub use diff::generate_diff;
pub use entry::{AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
