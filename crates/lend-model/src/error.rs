use std::fmt;

use lend_types::{ItemId, LoanId, Money, Timestamp, TypeError};

use crate::loan::LoanStatus;

/// Business-rule violations raised by domain entities.
///
/// Every variant names the precondition that failed. None of them are
/// faults and none are retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("invalid copy counts: available {available} exceeds total {total}")]
    InvalidCopyCount { total: u32, available: u32 },

    #[error("cannot set total copies to {requested}: {on_loan} copies are on loan")]
    TotalBelowOnLoan { requested: u32, on_loan: u32 },

    #[error("item {0} has been retired")]
    ItemRetired(ItemId),

    #[error("membership expiry must move forward (current {current}, requested {requested})")]
    ExpiryNotExtended {
        current: Timestamp,
        requested: Timestamp,
    },

    #[error("member loan limit must be at least one")]
    ZeroLoanLimit,

    #[error("payment of {amount} exceeds outstanding balance of {balance}")]
    PaymentExceedsBalance { amount: Money, balance: Money },

    #[error("due date {days} days after {from} is out of range")]
    DueDateOutOfRange { from: Timestamp, days: i64 },

    #[error("payment of {amount} exceeds the {payable} payable directly; {held} is owed as loan late fees")]
    PaymentCoversLoanFees {
        amount: Money,
        payable: Money,
        held: Money,
    },

    #[error("loan cannot be renewed: {0}")]
    CannotRenew(RenewalRefusal),

    #[error("loan {loan} was already returned at {returned_at}")]
    AlreadyReturned { loan: LoanId, returned_at: Timestamp },

    #[error("loan {loan} is {status}, expected active")]
    NotActive { loan: LoanId, status: LoanStatus },

    #[error("loan {loan} has not been returned")]
    NotReturned { loan: LoanId },

    #[error("loan {loan} is already marked damaged")]
    AlreadyDamaged { loan: LoanId },

    #[error("loan {loan} has no outstanding late fee")]
    NoLateFee { loan: LoanId },

    #[error("late fee for loan {loan} is already paid")]
    LateFeeAlreadyPaid { loan: LoanId },

    #[error("loan {loan} is inconsistent: {reason}")]
    CorruptLoan { loan: LoanId, reason: String },

    #[error(transparent)]
    Amount(#[from] TypeError),
}

/// Why a renewal was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenewalRefusal {
    /// Only active loans can be renewed.
    NotActive(LoanStatus),
    /// The loan is already past its due date.
    Overdue { due: Timestamp },
    /// The loan has used all of its renewals.
    LimitReached { max: u32 },
    /// The requested extension is zero or negative.
    InvalidExtension,
    /// The extended due date would fall outside the representable calendar.
    ExtensionTooLong { days: i64 },
}

impl fmt::Display for RenewalRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive(status) => write!(f, "loan is {status}"),
            Self::Overdue { due } => write!(f, "loan was due at {due}"),
            Self::LimitReached { max } => write!(f, "limit of {max} renewals reached"),
            Self::InvalidExtension => write!(f, "extension must be positive"),
            Self::ExtensionTooLong { days } => write!(f, "extension of {days} days is too long"),
        }
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
