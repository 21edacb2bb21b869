use lend_model::DomainError;
use lend_store::StoreError;
use lend_types::ItemId;

/// Errors produced by inventory ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("catalog item not found: {0}")]
    ItemNotFound(ItemId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for inventory ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
