//! Audit logging for backup and restore operations
//!
//! Records who created or restored an artifact, its size and a digest
//! prefix, in an append-only JSONL file.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall_vault::audit::{AuditEntry, AuditLogger};
//!
//! let logger = AuditLogger::new(paths.audit_log());
//! logger.record(&AuditEntry::backup_created("principal", 4096, "3f2a9c01b7de"));
//! ```

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation};
pub use logger::AuditLogger;
