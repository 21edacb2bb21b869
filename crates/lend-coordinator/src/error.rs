use lend_audit::AuditError;
use lend_ledger::LedgerError;
use lend_model::{DomainError, Ineligibility};
use lend_store::StoreError;
use lend_types::{ItemId, LoanId, MemberId, RequestId};

/// How a caller should treat a failed workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// A domain rule refused the request. Retrying will not help.
    BusinessRule,
    /// Stored state is inconsistent or a bug was detected.
    Invariant,
    /// Contention or unavailability. The request may succeed if retried.
    Transient,
}

/// Errors returned by [`LendingCoordinator`](crate::LendingCoordinator).
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("member {member} may not borrow: {}", describe(.reasons))]
    MemberIneligible {
        member: MemberId,
        reasons: Vec<Ineligibility>,
    },

    #[error("no copy of item {0} is available")]
    ItemUnavailable(ItemId),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("loan not found: {0}")]
    LoanNotFound(LoanId),

    #[error("request {request} already completed for loan {loan}")]
    AlreadyCompleted { request: RequestId, loan: LoanId },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

fn describe(reasons: &[Ineligibility]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LendingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Domain(DomainError::CorruptLoan { .. } | DomainError::InvalidCopyCount { .. }) => {
                ErrorClass::Invariant
            }
            Self::Store(e) if e.is_transient() => ErrorClass::Transient,
            Self::Store(e) if e.is_invariant() => ErrorClass::Invariant,
            Self::Audit(_) => ErrorClass::Invariant,
            _ => ErrorClass::BusinessRule,
        }
    }

    /// Returns `true` if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<StoreError> for LendingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(domain) => Self::Domain(domain),
            other => Self::Store(other),
        }
    }
}

impl From<LedgerError> for LendingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ItemNotFound(id) => Self::ItemNotFound(id),
            LedgerError::Domain(domain) => Self::Domain(domain),
            LedgerError::Store(store) => store.into(),
        }
    }
}

/// Result alias for coordinator operations.
pub type LendingResult<T> = Result<T, LendingError>;
