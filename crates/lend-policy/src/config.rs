use std::path::Path;

use chrono::Duration;
use lend_types::Money;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// Longest loan or renewal period a policy may set (ten years).
pub const MAX_PERIOD_DAYS: u32 = 3_650;

/// Policy constants governing loans, renewals, late fees, and eligibility.
///
/// A policy file is TOML; missing fields fall back to the defaults:
///
/// ```toml
/// loan_period_days = 14
/// renewal_period_days = 14
/// max_renewals = 2
/// late_fee_per_day = "0.50"
/// fee_ceiling = "10.00"
/// max_concurrent_loans = 5
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LendingPolicy {
    /// Days between borrowing and the initial due date.
    pub loan_period_days: u32,
    /// Days a renewal extends the due date by when the caller gives none.
    pub renewal_period_days: u32,
    /// How many times a single loan may be renewed.
    pub max_renewals: u32,
    /// Fee charged for each started day past the due date.
    pub late_fee_per_day: Money,
    /// Highest outstanding balance a member may carry and still borrow.
    pub fee_ceiling: Money,
    /// Concurrent-loan limit given to newly registered members.
    pub max_concurrent_loans: u32,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            renewal_period_days: 14,
            max_renewals: 2,
            late_fee_per_day: Money::from_cents(50),
            fee_ceiling: Money::from_cents(1_000),
            max_concurrent_loans: 5,
        }
    }
}

impl LendingPolicy {
    /// Parse and validate a policy from TOML text.
    pub fn from_toml_str(text: &str) -> PolicyResult<Self> {
        let policy: Self = toml::from_str(text)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read, parse, and validate a policy file.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), ?policy, "lending policy loaded");
        Ok(policy)
    }

    /// Serialize the policy back to TOML.
    pub fn to_toml_string(&self) -> PolicyResult<String> {
        toml::to_string(self).map_err(|e| PolicyError::Invalid {
            field: "policy",
            reason: e.to_string(),
        })
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> PolicyResult<()> {
        check_period("loan_period_days", self.loan_period_days)?;
        check_period("renewal_period_days", self.renewal_period_days)?;
        if self.max_concurrent_loans == 0 {
            return Err(PolicyError::Invalid {
                field: "max_concurrent_loans",
                reason: "members must be allowed at least one loan".into(),
            });
        }
        Ok(())
    }

    /// The initial loan period as a duration.
    pub fn loan_period(&self) -> Duration {
        Duration::days(i64::from(self.loan_period_days))
    }

    /// The default renewal extension as a duration.
    pub fn renewal_period(&self) -> Duration {
        Duration::days(i64::from(self.renewal_period_days))
    }
}

fn check_period(field: &'static str, days: u32) -> PolicyResult<()> {
    if days == 0 {
        return Err(PolicyError::Invalid {
            field,
            reason: "must be at least one day".into(),
        });
    }
    if days > MAX_PERIOD_DAYS {
        return Err(PolicyError::Invalid {
            field,
            reason: format!("must be at most {MAX_PERIOD_DAYS} days"),
        });
    }
    Ok(())
}
