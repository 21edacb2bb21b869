use std::time::Duration;

use lend_audit::AuditError;
use lend_model::DomainError;
use lend_types::ItemId;

/// Errors from lending store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No write transaction could be started within the configured timeout.
    #[error("timed out after {waited:?} waiting for the store write lock")]
    LockTimeout { waited: Duration },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An entity with this id already exists.
    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// A staged entity change was refused by its domain rules.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// An item was mutated without a matching audit entry.
    #[error("item {item} has {mutations} mutation(s) but {records} audit record(s)")]
    UnauditedMutation {
        item: ItemId,
        mutations: u32,
        records: u32,
    },

    /// The last audit entry for an item does not describe its final state.
    #[error("audit entry for item {item} does not match the committed state")]
    AuditMismatch { item: ItemId },

    /// Committing would break a stored invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl StoreError {
    /// Returns `true` for failures that may succeed if the caller retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Returns `true` for failures that indicate corrupted state or a bug.
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            Self::UnauditedMutation { .. }
                | Self::AuditMismatch { .. }
                | Self::InvariantViolation(_)
                | Self::Audit(_)
        )
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
