//! Audit log of client mutations
//!
//! Every insert, update or delete the client issues successfully is appended
//! to `audit.log` as one JSON line with before/after snapshots.
//!
//! ```rust,ignore
//! let logger = AuditLogger::new(paths.audit_log());
//! logger.log(&AuditEntry::create(EntityType::ExpenseItem, item.id.as_str(), Some(item.description.clone()), &item))?;
//! ```

mod entry;
mod logger;

pub use entry::{AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
