use lend_types::{MemberId, Money, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A library member who borrows items.
///
/// Invariant: the outstanding fee balance is never negative. That follows
/// from the balance being [`Money`]; [`pay_fee`](Self::pay_fee) additionally
/// refuses payments larger than the balance instead of clamping them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    name: String,
    active: bool,
    membership_expires_at: Timestamp,
    outstanding_fees: Money,
    max_concurrent_loans: u32,
    created_at: Timestamp,
}

/// Raw field values of a [`Member`], as held by storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberParts {
    pub id: MemberId,
    pub name: String,
    pub active: bool,
    pub membership_expires_at: Timestamp,
    pub outstanding_fees: Money,
    pub max_concurrent_loans: u32,
    pub created_at: Timestamp,
}

impl Member {
    /// Register a new, active member with no fees.
    pub fn register(
        name: impl Into<String>,
        membership_expires_at: Timestamp,
        max_concurrent_loans: u32,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::EmptyField { field: "name" });
        }
        if max_concurrent_loans == 0 {
            return Err(DomainError::ZeroLoanLimit);
        }
        if membership_expires_at <= now {
            return Err(DomainError::ExpiryNotExtended {
                current: now,
                requested: membership_expires_at,
            });
        }
        Ok(Self {
            id: MemberId::new(),
            name,
            active: true,
            membership_expires_at,
            outstanding_fees: Money::ZERO,
            max_concurrent_loans,
            created_at: now,
        })
    }

    /// Rebuild a member from trusted storage without validation.
    pub fn rehydrate(parts: MemberParts) -> Self {
        Self {
            id: parts.id,
            name: parts.name,
            active: parts.active,
            membership_expires_at: parts.membership_expires_at,
            outstanding_fees: parts.outstanding_fees,
            max_concurrent_loans: parts.max_concurrent_loans,
            created_at: parts.created_at,
        }
    }

    /// Decompose into raw fields for storage.
    pub fn into_parts(self) -> MemberParts {
        MemberParts {
            id: self.id,
            name: self.name,
            active: self.active,
            membership_expires_at: self.membership_expires_at,
            outstanding_fees: self.outstanding_fees,
            max_concurrent_loans: self.max_concurrent_loans,
            created_at: self.created_at,
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn membership_expires_at(&self) -> Timestamp {
        self.membership_expires_at
    }

    pub fn outstanding_fees(&self) -> Money {
        self.outstanding_fees
    }

    pub fn max_concurrent_loans(&self) -> u32 {
        self.max_concurrent_loans
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns `true` if the membership has lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.membership_expires_at <= now
    }

    /// Increase the fee balance. The amount must be strictly positive.
    pub fn add_fee(&mut self, amount: Money) -> DomainResult<Money> {
        let amount = Money::positive(amount.amount())?;
        self.outstanding_fees = self.outstanding_fees.checked_add(amount)?;
        Ok(self.outstanding_fees)
    }

    /// Decrease the fee balance by a payment.
    ///
    /// The amount must be strictly positive and no larger than the balance.
    pub fn pay_fee(&mut self, amount: Money) -> DomainResult<Money> {
        let amount = Money::positive(amount.amount())?;
        if amount > self.outstanding_fees {
            return Err(DomainError::PaymentExceedsBalance {
                amount,
                balance: self.outstanding_fees,
            });
        }
        self.outstanding_fees = self.outstanding_fees.checked_sub(amount)?;
        Ok(self.outstanding_fees)
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn reactivate(&mut self) {
        self.active = true;
    }

    /// Push the membership expiry to `until`, which must be later.
    pub fn extend_membership(&mut self, until: Timestamp) -> DomainResult<()> {
        if until <= self.membership_expires_at {
            return Err(DomainError::ExpiryNotExtended {
                current: self.membership_expires_at,
                requested: until,
            });
        }
        self.membership_expires_at = until;
        Ok(())
    }

    /// Change the concurrent-loan limit.
    pub fn set_loan_limit(&mut self, limit: u32) -> DomainResult<()> {
        if limit == 0 {
            return Err(DomainError::ZeroLoanLimit);
        }
        self.max_concurrent_loans = limit;
        Ok(())
    }
}
