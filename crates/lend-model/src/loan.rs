use std::fmt;

use chrono::Duration;
use lend_policy::LendingPolicy;
use lend_types::{ItemId, LoanId, MemberId, Money, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult, RenewalRefusal};

/// Lifecycle state of a loan.
///
/// ```text
/// Active ──return──▶ Returned ──┐
///   │   └──return──▶ ReturnedLate ─┴─mark damaged─▶ Damaged
///   └──mark lost──▶ Lost
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// The item is out with the member.
    Active,
    /// Returned on or before the due date.
    Returned,
    /// Returned after the due date; a late fee was computed.
    ReturnedLate,
    /// Presumed not coming back. `returned_at` stays unset.
    Lost,
    /// Returned, then found damaged.
    Damaged,
}

impl LoanStatus {
    /// Returns `true` for states that imply the item is physically back.
    pub fn is_returned(&self) -> bool {
        matches!(self, Self::Returned | Self::ReturnedLate | Self::Damaged)
    }

    /// Returns `true` for every state other than `Active`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Returned => "returned",
            Self::ReturnedLate => "returned late",
            Self::Lost => "lost",
            Self::Damaged => "damaged",
        };
        f.write_str(s)
    }
}

/// What a return produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub status: LoanStatus,
    pub returned_at: Timestamp,
    pub days_late: u32,
    pub late_fee: Money,
}

/// One borrowing transaction: a member holding a copy of an item.
///
/// Invariants:
/// - `returned_at` is set iff the status is a returned variant;
/// - `renewal_count <= max_renewals`;
/// - `late_fee` is only set once `returned_at` is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    id: LoanId,
    member_id: MemberId,
    item_id: ItemId,
    borrowed_at: Timestamp,
    due_at: Timestamp,
    returned_at: Option<Timestamp>,
    status: LoanStatus,
    late_fee: Option<Money>,
    fee_paid: bool,
    renewal_count: u32,
    max_renewals: u32,
    damage_notes: Option<String>,
}

/// Raw field values of a [`Loan`], as held by storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanParts {
    pub id: LoanId,
    pub member_id: MemberId,
    pub item_id: ItemId,
    pub borrowed_at: Timestamp,
    pub due_at: Timestamp,
    pub returned_at: Option<Timestamp>,
    pub status: LoanStatus,
    pub late_fee: Option<Money>,
    pub fee_paid: bool,
    pub renewal_count: u32,
    pub max_renewals: u32,
    pub damage_notes: Option<String>,
}

impl Loan {
    /// Open a new active loan due one loan period from `now`.
    ///
    /// Fails if the due date falls outside the representable calendar.
    pub fn open(
        member_id: MemberId,
        item_id: ItemId,
        policy: &LendingPolicy,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let period = policy.loan_period();
        let due_at = now
            .checked_add_signed(period)
            .ok_or(DomainError::DueDateOutOfRange {
                from: now,
                days: period.num_days(),
            })?;
        Ok(Self {
            id: LoanId::new(),
            member_id,
            item_id,
            borrowed_at: now,
            due_at,
            returned_at: None,
            status: LoanStatus::Active,
            late_fee: None,
            fee_paid: false,
            renewal_count: 0,
            max_renewals: policy.max_renewals,
            damage_notes: None,
        })
    }

    /// Rebuild a loan from trusted storage without validation.
    pub fn rehydrate(parts: LoanParts) -> Self {
        Self {
            id: parts.id,
            member_id: parts.member_id,
            item_id: parts.item_id,
            borrowed_at: parts.borrowed_at,
            due_at: parts.due_at,
            returned_at: parts.returned_at,
            status: parts.status,
            late_fee: parts.late_fee,
            fee_paid: parts.fee_paid,
            renewal_count: parts.renewal_count,
            max_renewals: parts.max_renewals,
            damage_notes: parts.damage_notes,
        }
    }

    /// Decompose into raw fields for storage.
    pub fn into_parts(self) -> LoanParts {
        LoanParts {
            id: self.id,
            member_id: self.member_id,
            item_id: self.item_id,
            borrowed_at: self.borrowed_at,
            due_at: self.due_at,
            returned_at: self.returned_at,
            status: self.status,
            late_fee: self.late_fee,
            fee_paid: self.fee_paid,
            renewal_count: self.renewal_count,
            max_renewals: self.max_renewals,
            damage_notes: self.damage_notes,
        }
    }

    pub fn id(&self) -> LoanId {
        self.id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn borrowed_at(&self) -> Timestamp {
        self.borrowed_at
    }

    pub fn due_at(&self) -> Timestamp {
        self.due_at
    }

    pub fn returned_at(&self) -> Option<Timestamp> {
        self.returned_at
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn late_fee(&self) -> Option<Money> {
        self.late_fee
    }

    pub fn is_fee_paid(&self) -> bool {
        self.fee_paid
    }

    pub fn renewal_count(&self) -> u32 {
        self.renewal_count
    }

    pub fn max_renewals(&self) -> u32 {
        self.max_renewals
    }

    pub fn damage_notes(&self) -> Option<&str> {
        self.damage_notes.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Returns `true` if the loan is still out and past its due date.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.is_active() && now > self.due_at
    }

    /// Started days past the due date at `now`; zero when not overdue.
    pub fn days_overdue(&self, now: Timestamp) -> u32 {
        if !self.is_active() {
            return 0;
        }
        days_late(self.due_at, now)
    }

    /// The fee the member would owe if the loan were returned at `now`.
    pub fn accrued_fee(&self, now: Timestamp, rate: Money) -> DomainResult<Money> {
        Ok(rate.times(self.days_overdue(now))?)
    }

    /// Returns `true` if a non-zero late fee is waiting to be paid.
    pub fn has_unpaid_fee(&self) -> bool {
        !self.fee_paid && self.late_fee.is_some_and(|fee| !fee.is_zero())
    }

    /// Extend the due date by `extension`.
    ///
    /// Allowed only while active, not overdue, and under the renewal limit.
    pub fn renew(&mut self, extension: Duration, now: Timestamp) -> DomainResult<Timestamp> {
        if self.status != LoanStatus::Active {
            return Err(DomainError::CannotRenew(RenewalRefusal::NotActive(
                self.status,
            )));
        }
        if now > self.due_at {
            return Err(DomainError::CannotRenew(RenewalRefusal::Overdue {
                due: self.due_at,
            }));
        }
        if self.renewal_count >= self.max_renewals {
            return Err(DomainError::CannotRenew(RenewalRefusal::LimitReached {
                max: self.max_renewals,
            }));
        }
        if extension <= Duration::zero() {
            return Err(DomainError::CannotRenew(RenewalRefusal::InvalidExtension));
        }

        let due_at = self.due_at.checked_add_signed(extension).ok_or(
            DomainError::CannotRenew(RenewalRefusal::ExtensionTooLong {
                days: extension.num_days(),
            }),
        )?;
        self.due_at = due_at;
        self.renewal_count += 1;
        Ok(self.due_at)
    }

    /// Record the physical return of the item and compute the late fee.
    ///
    /// Overdue-ness is decided from `now` before any field changes, so the
    /// status and the fee always agree.
    pub fn return_item(&mut self, now: Timestamp, rate: Money) -> DomainResult<ReturnSummary> {
        if let Some(returned_at) = self.returned_at {
            return Err(DomainError::AlreadyReturned {
                loan: self.id,
                returned_at,
            });
        }
        if self.status != LoanStatus::Active {
            return Err(DomainError::NotActive {
                loan: self.id,
                status: self.status,
            });
        }

        let days_late = days_late(self.due_at, now);
        let late_fee = rate.times(days_late)?;
        let status = if days_late > 0 {
            LoanStatus::ReturnedLate
        } else {
            LoanStatus::Returned
        };

        self.returned_at = Some(now);
        self.status = status;
        self.late_fee = Some(late_fee);

        Ok(ReturnSummary {
            status,
            returned_at: now,
            days_late,
            late_fee,
        })
    }

    /// Declare the item lost. The loan closes without a return time.
    pub fn mark_lost(&mut self) -> DomainResult<()> {
        if let Some(returned_at) = self.returned_at {
            return Err(DomainError::AlreadyReturned {
                loan: self.id,
                returned_at,
            });
        }
        if self.status != LoanStatus::Active {
            return Err(DomainError::NotActive {
                loan: self.id,
                status: self.status,
            });
        }
        self.status = LoanStatus::Lost;
        Ok(())
    }

    /// Record damage found after the item came back.
    pub fn mark_damaged(&mut self, notes: impl Into<String>) -> DomainResult<()> {
        let notes = notes.into();
        if notes.trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "damage notes",
            });
        }
        match self.status {
            LoanStatus::Returned | LoanStatus::ReturnedLate => {}
            LoanStatus::Damaged => return Err(DomainError::AlreadyDamaged { loan: self.id }),
            LoanStatus::Active | LoanStatus::Lost => {
                return Err(DomainError::NotReturned { loan: self.id })
            }
        }
        self.status = LoanStatus::Damaged;
        self.damage_notes = Some(notes);
        Ok(())
    }

    /// Settle the late fee in full.
    pub fn pay_late_fee(&mut self) -> DomainResult<Money> {
        let fee = match self.late_fee {
            Some(fee) if !fee.is_zero() => fee,
            _ => return Err(DomainError::NoLateFee { loan: self.id }),
        };
        if self.fee_paid {
            return Err(DomainError::LateFeeAlreadyPaid { loan: self.id });
        }
        self.fee_paid = true;
        Ok(fee)
    }

    /// Verify the structural invariants (useful after rehydration).
    pub fn check_invariants(&self) -> DomainResult<()> {
        let corrupt = |reason: &str| DomainError::CorruptLoan {
            loan: self.id,
            reason: reason.to_string(),
        };
        if self.returned_at.is_some() != self.status.is_returned() {
            return Err(corrupt("returned_at does not match status"));
        }
        if self.renewal_count > self.max_renewals {
            return Err(corrupt("renewal count exceeds limit"));
        }
        if self.late_fee.is_some() && self.returned_at.is_none() {
            return Err(corrupt("late fee set before return"));
        }
        if self.fee_paid && self.late_fee.is_none() {
            return Err(corrupt("fee marked paid without a fee"));
        }
        Ok(())
    }
}

/// Started days between `due` and `at`; any fraction of a day counts.
fn days_late(due: Timestamp, at: Timestamp) -> u32 {
    let late = at - due;
    if late <= Duration::zero() {
        return 0;
    }
    let whole = late.num_days();
    let days = if late - Duration::days(whole) > Duration::zero() {
        whole + 1
    } else {
        whole
    };
    u32::try_from(days).unwrap_or(u32::MAX)
}
