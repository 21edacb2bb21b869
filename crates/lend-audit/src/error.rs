/// Errors produced by audit trail operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("malformed audit entry: {reason}")]
    MalformedEntry { reason: String },

    #[error("integrity violation at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("audit backend error: {0}")]
    Backend(String),
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
