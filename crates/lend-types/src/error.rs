use thiserror::Error;

/// Errors produced by type operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount must not be negative: {0}")]
    NegativeAmount(String),

    #[error("amount must be strictly positive: {0}")]
    NonPositiveAmount(String),

    #[error("arithmetic overflow in money calculation")]
    Overflow,

    #[error("money calculation would go below zero: {lhs} - {rhs}")]
    Underflow { lhs: String, rhs: String },
}
