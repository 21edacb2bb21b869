//! Borrow eligibility.
//!
//! A pure predicate over a [`Member`] snapshot. It gates but never mutates,
//! so it is safe to evaluate outside a transaction.

use std::fmt;

use lend_policy::LendingPolicy;
use lend_types::{Money, Timestamp};
use serde::{Deserialize, Serialize};

use crate::member::Member;

/// One reason a member may not borrow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ineligibility {
    /// The account has been deactivated.
    Inactive,
    /// The membership lapsed.
    MembershipExpired { expired_at: Timestamp },
    /// Outstanding fees are above the policy ceiling.
    FeesOverCeiling { outstanding: Money, ceiling: Money },
    /// The member already holds as many loans as allowed.
    LoanLimitReached { active: u32, limit: u32 },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "membership is inactive"),
            Self::MembershipExpired { expired_at } => {
                write!(f, "membership expired at {expired_at}")
            }
            Self::FeesOverCeiling {
                outstanding,
                ceiling,
            } => write!(f, "outstanding fees {outstanding} exceed ceiling {ceiling}"),
            Self::LoanLimitReached { active, limit } => {
                write!(f, "{active} active loans, limit is {limit}")
            }
        }
    }
}

/// Returns `true` iff the member is active, unexpired, and at or under the
/// fee ceiling.
pub fn can_borrow(member: &Member, policy: &LendingPolicy, now: Timestamp) -> bool {
    member.is_active()
        && !member.is_expired(now)
        && member.outstanding_fees() <= policy.fee_ceiling
}

/// Every reason the member may not open another loan, including the
/// concurrent-loan limit. An empty list means the borrow may proceed.
pub fn assess(
    member: &Member,
    policy: &LendingPolicy,
    now: Timestamp,
    active_loans: u32,
) -> Vec<Ineligibility> {
    let mut reasons = Vec::new();
    if !member.is_active() {
        reasons.push(Ineligibility::Inactive);
    }
    if member.is_expired(now) {
        reasons.push(Ineligibility::MembershipExpired {
            expired_at: member.membership_expires_at(),
        });
    }
    if member.outstanding_fees() > policy.fee_ceiling {
        reasons.push(Ineligibility::FeesOverCeiling {
            outstanding: member.outstanding_fees(),
            ceiling: policy.fee_ceiling,
        });
    }
    if active_loans >= member.max_concurrent_loans() {
        reasons.push(Ineligibility::LoanLimitReached {
            active: active_loans,
            limit: member.max_concurrent_loans(),
        });
    }
    reasons
}
