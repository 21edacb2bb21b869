//! Audit trail of catalog item mutations.
//!
//! Every committed change to a catalog item's copy counts or lifecycle
//! produces exactly one [`AuditRecord`], appended in the same transaction as
//! the change itself. Records are never updated or removed.
//!
//! Records are sequence-numbered and hash-linked: each record carries the
//! BLAKE3 hash of its predecessor, so any edit to history breaks the chain
//! and is reported by [`TrailValidator`].

pub mod error;
pub mod record;
pub mod traits;
pub mod validation;

pub use error::{AuditError, AuditResult};
pub use record::{AuditEntry, AuditOperation, AuditRecord, ItemSnapshot};
pub use traits::{AuditHead, AuditReader};
pub use validation::{TrailReport, TrailValidator, Violation, ViolationKind};
