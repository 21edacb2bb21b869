use std::sync::Arc;

use chrono::Duration;
use lend_audit::{AuditRecord, TrailReport, TrailValidator};
use lend_ledger::{CopyReturn, InventoryLedger};
use lend_model::{assess, CatalogItem, DomainError, DomainResult, Ineligibility, Loan, Member};
use lend_policy::LendingPolicy;
use lend_store::{FeeAdjustment, LendingStore};
use lend_types::{Actor, Clock, ItemId, LoanId, MemberId, Money, SystemClock, Timestamp};
use tracing::{debug, error, info, warn};

use crate::error::{ErrorClass, LendingError, LendingResult};
use crate::request::{BorrowRequest, LateFeePayment, ReturnReceipt, ReturnRequest};

/// Runs lending workflows against a shared store.
///
/// Each public operation is one store transaction. On any error the
/// transaction is dropped before commit, so no partial effect is ever
/// visible. Dropping an operation's future before it completes has the
/// same effect.
pub struct LendingCoordinator<S> {
    store: Arc<S>,
    policy: LendingPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: LendingStore> LendingCoordinator<S> {
    pub fn new(store: Arc<S>, policy: LendingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    /// A coordinator reading the wall clock.
    pub fn with_system_clock(store: Arc<S>, policy: LendingPolicy) -> Self {
        Self::new(store, policy, Arc::new(SystemClock))
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ---- Core workflows ----

    /// Lend one copy of an item to a member.
    ///
    /// Checks eligibility (including the concurrent-loan limit), takes a
    /// copy through the inventory ledger, and opens an active loan, all in
    /// one transaction.
    pub async fn borrow(&self, request: BorrowRequest) -> LendingResult<Loan> {
        self.try_borrow(request)
            .await
            .inspect_err(|e| log_failure("borrow", e))
    }

    async fn try_borrow(&self, request: BorrowRequest) -> LendingResult<Loan> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        if let Some(loan) = tx.completed_request(request.request_id)? {
            return Err(LendingError::AlreadyCompleted {
                request: request.request_id,
                loan,
            });
        }

        let member = tx
            .member(request.member_id)?
            .ok_or(LendingError::MemberNotFound(request.member_id))?;
        let active = tx.active_loan_count(member.id())?;
        let reasons = assess(&member, &self.policy, now, active);
        if !reasons.is_empty() {
            return Err(LendingError::MemberIneligible {
                member: member.id(),
                reasons,
            });
        }

        if !InventoryLedger::borrow_copy(tx.as_mut(), request.item_id, &request.actor, now)? {
            return Err(LendingError::ItemUnavailable(request.item_id));
        }

        let loan = Loan::open(member.id(), request.item_id, &self.policy, now)?;
        tx.put_loan(loan.clone())?;
        tx.record_request(request.request_id, loan.id())?;
        tx.commit()?;

        info!(
            loan = %loan.id(),
            member = %loan.member_id(),
            item = %loan.item_id(),
            due = %loan.due_at(),
            actor = %request.actor,
            "loan opened"
        );
        Ok(loan)
    }

    /// Close a loan by returning its copy.
    ///
    /// Any late fee is charged to the member's balance in the same
    /// transaction.
    pub async fn return_loan(&self, request: ReturnRequest) -> LendingResult<ReturnReceipt> {
        self.try_return(request)
            .await
            .inspect_err(|e| log_failure("return", e))
    }

    async fn try_return(&self, request: ReturnRequest) -> LendingResult<ReturnReceipt> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        if let Some(loan) = tx.completed_request(request.request_id)? {
            return Err(LendingError::AlreadyCompleted {
                request: request.request_id,
                loan,
            });
        }

        let mut loan = tx
            .loan(request.loan_id)?
            .ok_or(LendingError::LoanNotFound(request.loan_id))?;
        let member = tx
            .member(loan.member_id())?
            .ok_or(LendingError::MemberNotFound(loan.member_id()))?;

        let summary = loan.return_item(now, self.policy.late_fee_per_day)?;
        let copy = InventoryLedger::return_copy(tx.as_mut(), loan.item_id(), &request.actor, now)?;
        if copy == CopyReturn::Missing {
            return Err(LendingError::ItemNotFound(loan.item_id()));
        }

        let member_balance = if summary.late_fee.is_zero() {
            member.outstanding_fees()
        } else {
            tx.adjust_member_fees(member.id(), FeeAdjustment::Charge(summary.late_fee))?
        };

        tx.put_loan(loan.clone())?;
        tx.record_request(request.request_id, loan.id())?;
        tx.commit()?;

        info!(
            loan = %loan.id(),
            item = %loan.item_id(),
            status = %summary.status,
            days_late = summary.days_late,
            fee = %summary.late_fee,
            actor = %request.actor,
            "loan returned"
        );
        if copy.is_discrepancy() {
            error!(
                loan = %loan.id(),
                item = %loan.item_id(),
                "returned copy did not fit on the shelf; inventory needs reconciling"
            );
        }
        Ok(ReturnReceipt {
            loan,
            summary,
            member_balance,
            inventory_discrepancy: copy.is_discrepancy(),
        })
    }

    // ---- Loan lifecycle ----

    /// Extend an active loan's due date. Without `extra_days` the policy's
    /// renewal period is used.
    pub async fn renew(&self, loan: LoanId, extra_days: Option<u32>) -> LendingResult<Loan> {
        let extension = extra_days
            .map(|days| Duration::days(i64::from(days)))
            .unwrap_or_else(|| self.policy.renewal_period());
        let now = self.clock.now();
        let loan = self
            .update_loan("renew", loan, |loan| loan.renew(extension, now).map(|_| ()))
            .await?;
        info!(
            loan = %loan.id(),
            due = %loan.due_at(),
            renewals = loan.renewal_count(),
            "loan renewed"
        );
        Ok(loan)
    }

    /// Close an unreturned loan as lost. The copy stays counted as out.
    pub async fn mark_lost(&self, loan: LoanId) -> LendingResult<Loan> {
        let loan = self.update_loan("mark_lost", loan, Loan::mark_lost).await?;
        info!(loan = %loan.id(), item = %loan.item_id(), "loan marked lost");
        Ok(loan)
    }

    /// Record damage found on a returned copy.
    pub async fn mark_damaged(&self, loan: LoanId, notes: &str) -> LendingResult<Loan> {
        let notes = notes.to_owned();
        let loan = self
            .update_loan("mark_damaged", loan, move |loan| loan.mark_damaged(notes))
            .await?;
        info!(loan = %loan.id(), item = %loan.item_id(), "loan marked damaged");
        Ok(loan)
    }

    /// Settle a returned loan's late fee and take the same amount off the
    /// member's balance.
    pub async fn pay_late_fee(&self, loan_id: LoanId) -> LendingResult<LateFeePayment> {
        let result = async {
            let mut tx = self.store.begin().await?;
            let mut loan = tx
                .loan(loan_id)?
                .ok_or(LendingError::LoanNotFound(loan_id))?;
            let paid = loan.pay_late_fee()?;
            let member_balance =
                tx.adjust_member_fees(loan.member_id(), FeeAdjustment::Pay(paid))?;
            tx.put_loan(loan.clone())?;
            tx.commit()?;
            Ok::<_, LendingError>(LateFeePayment {
                loan,
                paid,
                member_balance,
            })
        }
        .await;

        let payment = result.inspect_err(|e| log_failure("pay_late_fee", e))?;
        info!(
            loan = %loan_id,
            paid = %payment.paid,
            balance = %payment.member_balance,
            "late fee paid"
        );
        Ok(payment)
    }

    // ---- Member fees and administration ----

    /// Take a payment against a member's balance. Returns the new balance.
    ///
    /// Unpaid loan late fees are part of the balance but can only be settled
    /// through [`pay_late_fee`](Self::pay_late_fee), so the payment may not
    /// reach into them.
    pub async fn pay_member_fee(&self, member: MemberId, amount: Money) -> LendingResult<Money> {
        self.adjust_fees("pay_member_fee", member, FeeAdjustment::Pay(amount))
            .await
    }

    /// Charge a fee to a member. Returns the new balance.
    pub async fn charge_member_fee(&self, member: MemberId, amount: Money) -> LendingResult<Money> {
        self.adjust_fees("charge_member_fee", member, FeeAdjustment::Charge(amount))
            .await
    }

    /// Register a new member. Without `max_loans` the policy default applies.
    pub async fn register_member(
        &self,
        name: &str,
        membership_expires_at: Timestamp,
        max_loans: Option<u32>,
    ) -> LendingResult<Member> {
        let result = async {
            let limit = max_loans.unwrap_or(self.policy.max_concurrent_loans);
            let member = Member::register(name, membership_expires_at, limit, self.clock.now())?;
            let mut tx = self.store.begin().await?;
            tx.put_member(member.clone())?;
            tx.commit()?;
            Ok::<_, LendingError>(member)
        }
        .await;

        let member = result.inspect_err(|e| log_failure("register_member", e))?;
        info!(member = %member.id(), limit = member.max_concurrent_loans(), "member registered");
        Ok(member)
    }

    pub async fn deactivate_member(&self, member: MemberId) -> LendingResult<Member> {
        self.update_member("deactivate_member", member, |m| {
            m.deactivate();
            Ok(())
        })
        .await
    }

    pub async fn reactivate_member(&self, member: MemberId) -> LendingResult<Member> {
        self.update_member("reactivate_member", member, |m| {
            m.reactivate();
            Ok(())
        })
        .await
    }

    pub async fn extend_membership(
        &self,
        member: MemberId,
        until: Timestamp,
    ) -> LendingResult<Member> {
        self.update_member("extend_membership", member, move |m| {
            m.extend_membership(until)
        })
        .await
    }

    pub async fn set_loan_limit(&self, member: MemberId, limit: u32) -> LendingResult<Member> {
        self.update_member("set_loan_limit", member, move |m| m.set_loan_limit(limit))
            .await
    }

    // ---- Item administration ----

    pub async fn register_item(
        &self,
        title: &str,
        copies: u32,
        actor: Actor,
    ) -> LendingResult<CatalogItem> {
        let result = async {
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let item = InventoryLedger::register_item(tx.as_mut(), title, copies, &actor, now)?;
            tx.commit()?;
            Ok::<_, LendingError>(item)
        }
        .await;

        let item = result.inspect_err(|e| log_failure("register_item", e))?;
        info!(item = %item.id(), copies, "item registered");
        Ok(item)
    }

    pub async fn adjust_total_copies(
        &self,
        item: ItemId,
        new_total: u32,
        actor: Actor,
    ) -> LendingResult<CatalogItem> {
        let result = async {
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let item =
                InventoryLedger::adjust_total_copies(tx.as_mut(), item, new_total, &actor, now)?;
            tx.commit()?;
            Ok::<_, LendingError>(item)
        }
        .await;
        result.inspect_err(|e| log_failure("adjust_total_copies", e))
    }

    /// Withdraw an item from lending. Copies on loan can still come back.
    pub async fn retire_item(&self, item: ItemId, actor: Actor) -> LendingResult<CatalogItem> {
        let result = async {
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let item = InventoryLedger::retire_item(tx.as_mut(), item, &actor, now)?;
            tx.commit()?;
            Ok::<_, LendingError>(item)
        }
        .await;

        let item = result.inspect_err(|e| log_failure("retire_item", e))?;
        info!(item = %item.id(), on_loan = item.on_loan(), "item retired");
        Ok(item)
    }

    // ---- Reads (committed state only) ----

    pub fn loan(&self, id: LoanId) -> LendingResult<Loan> {
        self.store.loan(id)?.ok_or(LendingError::LoanNotFound(id))
    }

    pub fn item(&self, id: ItemId) -> LendingResult<CatalogItem> {
        self.store.item(id)?.ok_or(LendingError::ItemNotFound(id))
    }

    pub fn member(&self, id: MemberId) -> LendingResult<Member> {
        self.store.member(id)?.ok_or(LendingError::MemberNotFound(id))
    }

    /// Active loans past their due date at `now`, most overdue first.
    pub fn overdue_loans(&self, now: Timestamp) -> LendingResult<Vec<Loan>> {
        let mut overdue: Vec<Loan> = self
            .store
            .loans()?
            .into_iter()
            .filter(|loan| loan.is_overdue(now))
            .collect();
        overdue.sort_by_key(Loan::due_at);
        Ok(overdue)
    }

    /// The member's active loans, oldest first.
    pub fn active_loans_for(&self, member: MemberId) -> LendingResult<Vec<Loan>> {
        Ok(self
            .store
            .loans_for_member(member)?
            .into_iter()
            .filter(Loan::is_active)
            .collect())
    }

    /// Every reason the member could not borrow right now.
    pub fn eligibility(&self, member: MemberId) -> LendingResult<Vec<Ineligibility>> {
        let record = self.member(member)?;
        let active = self.active_loans_for(member)?.len() as u32;
        Ok(assess(&record, &self.policy, self.clock.now(), active))
    }

    /// The audit trail of one item, oldest first.
    pub fn audit_trail(&self, item: ItemId) -> LendingResult<Vec<AuditRecord>> {
        Ok(self.store.records_for_item(item)?)
    }

    /// Validate the whole audit trail's hash chain and snapshot continuity.
    pub fn verify_audit_trail(&self) -> LendingResult<TrailReport> {
        let report = TrailValidator::validate(&*self.store)?;
        if !report.is_valid() {
            error!(
                violations = report.violations.len(),
                first = ?report.violations.first(),
                "audit trail failed validation"
            );
        }
        Ok(report)
    }

    // ---- Helpers ----

    async fn update_loan<F>(
        &self,
        operation: &'static str,
        id: LoanId,
        change: F,
    ) -> LendingResult<Loan>
    where
        F: FnOnce(&mut Loan) -> DomainResult<()> + Send,
    {
        let result = async {
            let mut tx = self.store.begin().await?;
            let mut loan = tx.loan(id)?.ok_or(LendingError::LoanNotFound(id))?;
            change(&mut loan)?;
            tx.put_loan(loan.clone())?;
            tx.commit()?;
            Ok::<_, LendingError>(loan)
        }
        .await;
        result.inspect_err(|e| log_failure(operation, e))
    }

    async fn update_member<F>(
        &self,
        operation: &'static str,
        id: MemberId,
        change: F,
    ) -> LendingResult<Member>
    where
        F: FnOnce(&mut Member) -> DomainResult<()> + Send,
    {
        let result = async {
            let mut tx = self.store.begin().await?;
            let mut member = tx.member(id)?.ok_or(LendingError::MemberNotFound(id))?;
            change(&mut member)?;
            tx.put_member(member.clone())?;
            tx.commit()?;
            Ok::<_, LendingError>(member)
        }
        .await;

        let member = result.inspect_err(|e| log_failure(operation, e))?;
        debug!(operation, member = %member.id(), "member updated");
        Ok(member)
    }

    async fn adjust_fees(
        &self,
        operation: &'static str,
        member: MemberId,
        adjustment: FeeAdjustment,
    ) -> LendingResult<Money> {
        let result = async {
            let mut tx = self.store.begin().await?;
            let current = tx
                .member(member)?
                .ok_or(LendingError::MemberNotFound(member))?;
            if let FeeAdjustment::Pay(amount) = adjustment {
                let held = unpaid_late_fees(&tx.loans_for_member(member)?)?;
                let balance = current.outstanding_fees();
                let payable = balance.checked_sub(held).unwrap_or(Money::ZERO);
                if amount > payable && amount <= balance {
                    return Err(DomainError::PaymentCoversLoanFees {
                        amount,
                        payable,
                        held,
                    }
                    .into());
                }
            }
            let balance = tx.adjust_member_fees(member, adjustment)?;
            tx.commit()?;
            Ok::<_, LendingError>(balance)
        }
        .await;

        let balance = result.inspect_err(|e| log_failure(operation, e))?;
        info!(operation, member = %member, balance = %balance, "member balance changed");
        Ok(balance)
    }
}

/// Sum of the late fees on `loans` that are still waiting to be paid.
fn unpaid_late_fees(loans: &[Loan]) -> DomainResult<Money> {
    let mut held = Money::ZERO;
    for fee in loans
        .iter()
        .filter(|loan| loan.has_unpaid_fee())
        .filter_map(Loan::late_fee)
    {
        held = held.checked_add(fee)?;
    }
    Ok(held)
}

fn log_failure(operation: &'static str, error: &LendingError) {
    match error.class() {
        ErrorClass::BusinessRule => debug!(operation, error = %error, "request refused"),
        ErrorClass::Transient => warn!(operation, error = %error, "request failed; may be retried"),
        ErrorClass::Invariant => error!(operation, error = %error, "invariant violation"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{TimeZone, Utc};
    use lend_audit::{AuditOperation, AuditReader};
    use lend_model::{DomainError, LoanStatus, RenewalRefusal};
    use lend_store::{InMemoryLendingStore, StoreConfig, StoreError};
    use lend_types::ManualClock;
    use rust_decimal_macros::dec;

    use super::*;

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 2, 3, 10, 0, 0).unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn desk() -> Actor {
        Actor::staff("front-desk")
    }

    struct Fixture {
        coordinator: Arc<LendingCoordinator<InMemoryLendingStore>>,
        store: Arc<InMemoryLendingStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_store(InMemoryLendingStore::new())
        }

        fn with_store(store: InMemoryLendingStore) -> Self {
            init_tracing();
            let store = Arc::new(store);
            let clock = Arc::new(ManualClock::new(start()));
            let coordinator = Arc::new(LendingCoordinator::new(
                store.clone(),
                LendingPolicy::default(),
                clock.clone(),
            ));
            Self {
                coordinator,
                store,
                clock,
            }
        }

        async fn member(&self) -> Member {
            self.coordinator
                .register_member("Ada", start() + Duration::days(365), None)
                .await
                .unwrap()
        }

        async fn item(&self, copies: u32) -> CatalogItem {
            self.coordinator
                .register_item("The Dispossessed", copies, desk())
                .await
                .unwrap()
        }

        async fn borrow(&self, member: &Member, item: &CatalogItem) -> LendingResult<Loan> {
            self.coordinator
                .borrow(BorrowRequest::new(member.id(), item.id(), desk()))
                .await
        }

        async fn give_back(&self, loan: &Loan) -> LendingResult<ReturnReceipt> {
            self.coordinator
                .return_loan(ReturnRequest::new(loan.id(), desk()))
                .await
        }

        fn available(&self, item: &CatalogItem) -> u32 {
            self.coordinator.item(item.id()).unwrap().available_copies()
        }
    }

    #[tokio::test]
    async fn borrow_takes_a_copy_and_opens_active_loan() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(3).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.borrowed_at(), start());
        assert_eq!(loan.due_at(), start() + Duration::days(14));
        assert_eq!(fx.available(&item), 2);
        assert_eq!(fx.coordinator.loan(loan.id()).unwrap(), loan);
    }

    #[tokio::test]
    async fn borrow_with_no_copy_left_fails_cleanly() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(0).await;

        let err = fx.borrow(&member, &item).await.unwrap_err();
        assert!(matches!(err, LendingError::ItemUnavailable(id) if id == item.id()));
        assert_eq!(err.class(), ErrorClass::BusinessRule);
        assert_eq!(fx.available(&item), 0);
        assert!(fx.store.loans().unwrap().is_empty());
        assert_eq!(fx.coordinator.audit_trail(item.id()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn borrow_then_return_restores_inventory() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        fx.clock.advance(Duration::days(5));
        let receipt = fx.give_back(&loan).await.unwrap();

        assert_eq!(receipt.summary.status, LoanStatus::Returned);
        assert_eq!(receipt.summary.late_fee, Money::ZERO);
        assert_eq!(receipt.member_balance, Money::ZERO);
        assert!(!receipt.inventory_discrepancy);
        assert_eq!(receipt.loan.returned_at(), Some(start() + Duration::days(5)));
        assert_eq!(fx.available(&item), 2);
    }

    #[tokio::test]
    async fn late_return_charges_fee_to_member() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        fx.clock.advance(Duration::days(17));
        let receipt = fx.give_back(&loan).await.unwrap();

        let fee = Money::new(dec!(1.50)).unwrap();
        assert_eq!(receipt.summary.status, LoanStatus::ReturnedLate);
        assert_eq!(receipt.summary.days_late, 3);
        assert_eq!(receipt.summary.late_fee, fee);
        assert_eq!(receipt.loan.late_fee(), Some(fee));
        assert_eq!(receipt.member_balance, fee);
        assert_eq!(
            fx.coordinator.member(member.id()).unwrap().outstanding_fees(),
            fee
        );
    }

    #[tokio::test]
    async fn second_return_fails_without_touching_inventory() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;

        let first = fx.borrow(&member, &item).await.unwrap();
        let _second = fx.borrow(&member, &item).await.unwrap();
        fx.give_back(&first).await.unwrap();
        assert_eq!(fx.available(&item), 1);
        let records = fx.store.record_count().unwrap();

        let err = fx.give_back(&first).await.unwrap_err();
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::AlreadyReturned { .. })
        ));
        assert_eq!(fx.available(&item), 1);
        assert_eq!(fx.store.record_count().unwrap(), records);
    }

    #[tokio::test]
    async fn renewal_limit_is_enforced() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;
        let loan = fx.borrow(&member, &item).await.unwrap();

        let once = fx.coordinator.renew(loan.id(), None).await.unwrap();
        assert_eq!(once.due_at(), start() + Duration::days(28));
        let twice = fx.coordinator.renew(loan.id(), Some(7)).await.unwrap();
        assert_eq!(twice.due_at(), start() + Duration::days(35));
        assert_eq!(twice.renewal_count(), 2);

        let err = fx.coordinator.renew(loan.id(), None).await.unwrap_err();
        assert!(err.to_string().contains("cannot be renewed"));
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::CannotRenew(RenewalRefusal::LimitReached { max: 2 }))
        ));
        assert_eq!(fx.coordinator.loan(loan.id()).unwrap().renewal_count(), 2);
    }

    #[tokio::test]
    async fn overdue_loan_cannot_be_renewed() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;
        let loan = fx.borrow(&member, &item).await.unwrap();

        fx.clock.advance(Duration::days(15));
        let err = fx.coordinator.renew(loan.id(), None).await.unwrap_err();
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::CannotRenew(RenewalRefusal::Overdue { .. }))
        ));
    }

    #[tokio::test]
    async fn member_over_fee_ceiling_is_refused() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;
        fx.coordinator
            .charge_member_fee(member.id(), Money::from_cents(1_500))
            .await
            .unwrap();

        let err = fx.borrow(&member, &item).await.unwrap_err();
        match err {
            LendingError::MemberIneligible { member: id, reasons } => {
                assert_eq!(id, member.id());
                assert_eq!(
                    reasons,
                    vec![Ineligibility::FeesOverCeiling {
                        outstanding: Money::from_cents(1_500),
                        ceiling: Money::from_cents(1_000),
                    }]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.available(&item), 2);
        assert!(!fx.coordinator.eligibility(member.id()).unwrap().is_empty());

        let balance = fx
            .coordinator
            .pay_member_fee(member.id(), Money::from_cents(600))
            .await
            .unwrap();
        assert_eq!(balance, Money::from_cents(900));
        fx.borrow(&member, &item).await.unwrap();
    }

    #[tokio::test]
    async fn overpayment_is_rejected() {
        let fx = Fixture::new();
        let member = fx.member().await;
        fx.coordinator
            .charge_member_fee(member.id(), Money::from_cents(100))
            .await
            .unwrap();
        let err = fx
            .coordinator
            .pay_member_fee(member.id(), Money::from_cents(200))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::PaymentExceedsBalance { .. })
        ));
        assert_eq!(
            fx.coordinator.member(member.id()).unwrap().outstanding_fees(),
            Money::from_cents(100)
        );
    }

    #[tokio::test]
    async fn loan_limit_counts_active_loans() {
        let fx = Fixture::new();
        let member = fx
            .coordinator
            .register_member("Shevek", start() + Duration::days(30), Some(1))
            .await
            .unwrap();
        let item = fx.item(3).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        let err = fx.borrow(&member, &item).await.unwrap_err();
        assert!(matches!(
            &err,
            LendingError::MemberIneligible { reasons, .. }
                if reasons == &vec![Ineligibility::LoanLimitReached { active: 1, limit: 1 }]
        ));

        fx.give_back(&loan).await.unwrap();
        fx.borrow(&member, &item).await.unwrap();
        assert_eq!(fx.coordinator.active_loans_for(member.id()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_and_expired_members_are_refused() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;

        fx.coordinator.deactivate_member(member.id()).await.unwrap();
        let err = fx.borrow(&member, &item).await.unwrap_err();
        assert!(matches!(
            &err,
            LendingError::MemberIneligible { reasons, .. } if reasons == &vec![Ineligibility::Inactive]
        ));

        fx.coordinator.reactivate_member(member.id()).await.unwrap();
        fx.clock.advance(Duration::days(366));
        assert!(matches!(
            fx.borrow(&member, &item).await,
            Err(LendingError::MemberIneligible { .. })
        ));

        let until = start() + Duration::days(730);
        let renewed = fx
            .coordinator
            .extend_membership(member.id(), until)
            .await
            .unwrap();
        assert_eq!(renewed.membership_expires_at(), until);
        fx.borrow(&member, &item).await.unwrap();
        assert_eq!(fx.available(&item), 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_business_errors() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;

        let err = fx
            .coordinator
            .borrow(BorrowRequest::new(MemberId::new(), item.id(), desk()))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::MemberNotFound(_)));

        let err = fx
            .coordinator
            .borrow(BorrowRequest::new(member.id(), ItemId::new(), desk()))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::ItemNotFound(_)));

        let err = fx
            .coordinator
            .return_loan(ReturnRequest::new(LoanId::new(), desk()))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::LoanNotFound(_)));
        assert_eq!(err.class(), ErrorClass::BusinessRule);
    }

    #[tokio::test]
    async fn replayed_requests_do_not_mutate_twice() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(3).await;

        let request = BorrowRequest::new(member.id(), item.id(), desk());
        let loan = fx.coordinator.borrow(request.clone()).await.unwrap();
        let err = fx.coordinator.borrow(request).await.unwrap_err();
        assert!(matches!(err, LendingError::AlreadyCompleted { loan: id, .. } if id == loan.id()));
        assert_eq!(fx.available(&item), 2);

        let request = ReturnRequest::new(loan.id(), desk());
        fx.coordinator.return_loan(request.clone()).await.unwrap();
        let err = fx.coordinator.return_loan(request).await.unwrap_err();
        assert!(matches!(err, LendingError::AlreadyCompleted { .. }));
        assert_eq!(fx.available(&item), 3);
    }

    #[tokio::test]
    async fn lost_and_damaged_loans() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;

        let lost = fx.borrow(&member, &item).await.unwrap();
        let lost = fx.coordinator.mark_lost(lost.id()).await.unwrap();
        assert_eq!(lost.status(), LoanStatus::Lost);
        assert_eq!(lost.returned_at(), None);
        assert!(matches!(
            fx.give_back(&lost).await,
            Err(LendingError::Domain(DomainError::NotActive { .. }))
        ));
        assert_eq!(fx.available(&item), 1);

        let loan = fx.borrow(&member, &item).await.unwrap();
        assert!(matches!(
            fx.coordinator.mark_damaged(loan.id(), "torn spine").await,
            Err(LendingError::Domain(DomainError::NotReturned { .. }))
        ));
        fx.give_back(&loan).await.unwrap();
        let damaged = fx
            .coordinator
            .mark_damaged(loan.id(), "torn spine")
            .await
            .unwrap();
        assert_eq!(damaged.status(), LoanStatus::Damaged);
        assert_eq!(damaged.damage_notes(), Some("torn spine"));
    }

    #[tokio::test]
    async fn paying_late_fee_settles_loan_and_balance() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        fx.clock.advance(Duration::days(16) + Duration::hours(2));
        let receipt = fx.give_back(&loan).await.unwrap();
        assert_eq!(receipt.summary.late_fee, Money::from_cents(150));

        let payment = fx.coordinator.pay_late_fee(loan.id()).await.unwrap();
        assert_eq!(payment.paid, Money::from_cents(150));
        assert_eq!(payment.member_balance, Money::ZERO);
        assert!(payment.loan.is_fee_paid());

        assert!(matches!(
            fx.coordinator.pay_late_fee(loan.id()).await,
            Err(LendingError::Domain(DomainError::LateFeeAlreadyPaid { .. }))
        ));
    }

    #[tokio::test]
    async fn member_payment_cannot_settle_loan_late_fees() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;

        let loan = fx.borrow(&member, &item).await.unwrap();
        fx.clock.advance(Duration::days(17));
        fx.give_back(&loan).await.unwrap();
        fx.coordinator
            .charge_member_fee(member.id(), Money::from_cents(200))
            .await
            .unwrap();

        let err = fx
            .coordinator
            .pay_member_fee(member.id(), Money::from_cents(201))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::PaymentCoversLoanFees { amount, payable, held })
                if amount == Money::from_cents(201)
                    && payable == Money::from_cents(200)
                    && held == Money::from_cents(150)
        ));
        assert_eq!(err.class(), ErrorClass::BusinessRule);

        let balance = fx
            .coordinator
            .pay_member_fee(member.id(), Money::from_cents(200))
            .await
            .unwrap();
        assert_eq!(balance, Money::from_cents(150));
        assert!(matches!(
            fx.coordinator
                .pay_member_fee(member.id(), Money::from_cents(150))
                .await,
            Err(LendingError::Domain(DomainError::PaymentCoversLoanFees { .. }))
        ));

        let payment = fx.coordinator.pay_late_fee(loan.id()).await.unwrap();
        assert_eq!(payment.paid, Money::from_cents(150));
        assert_eq!(payment.member_balance, Money::ZERO);
        assert!(!fx.coordinator.loan(loan.id()).unwrap().has_unpaid_fee());
    }

    #[tokio::test]
    async fn extension_past_calendar_end_is_refused() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;
        let loan = fx.borrow(&member, &item).await.unwrap();

        let err = fx
            .coordinator
            .renew(loan.id(), Some(u32::MAX))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::Domain(DomainError::CannotRenew(
                RenewalRefusal::ExtensionTooLong { .. }
            ))
        ));
        let stored = fx.coordinator.loan(loan.id()).unwrap();
        assert_eq!(stored.due_at(), loan.due_at());
        assert_eq!(stored.renewal_count(), 0);
    }

    #[tokio::test]
    async fn return_onto_full_shelf_is_flagged() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;
        let loan = fx.borrow(&member, &item).await.unwrap();

        // Put the copy back behind the coordinator's back.
        let mut tx = fx.store.begin().await.unwrap();
        InventoryLedger::return_copy(tx.as_mut(), item.id(), &desk(), start()).unwrap();
        tx.commit().unwrap();
        let records = fx.store.record_count().unwrap();

        let receipt = fx.give_back(&loan).await.unwrap();
        assert!(receipt.inventory_discrepancy);
        assert_eq!(receipt.loan.status(), LoanStatus::Returned);
        assert_eq!(fx.available(&item), 1);
        assert_eq!(fx.store.record_count().unwrap(), records);
    }

    #[tokio::test]
    async fn overdue_report_lists_active_late_loans() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(3).await;

        let early = fx.borrow(&member, &item).await.unwrap();
        fx.clock.advance(Duration::days(3));
        let later = fx.borrow(&member, &item).await.unwrap();
        let returned = fx.borrow(&member, &item).await.unwrap();
        fx.give_back(&returned).await.unwrap();

        let now = start() + Duration::days(20);
        let overdue = fx.coordinator.overdue_loans(now).unwrap();
        let ids: Vec<LoanId> = overdue.iter().map(Loan::id).collect();
        assert_eq!(ids, vec![early.id(), later.id()]);
        assert!(fx.coordinator.overdue_loans(start()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn item_administration_is_audited() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;

        fx.borrow(&member, &item).await.unwrap();
        let grown = fx
            .coordinator
            .adjust_total_copies(item.id(), 5, desk())
            .await
            .unwrap();
        assert_eq!(grown.available_copies(), 4);

        let retired = fx.coordinator.retire_item(item.id(), desk()).await.unwrap();
        assert!(retired.is_soft_deleted());
        assert!(matches!(
            fx.borrow(&member, &item).await,
            Err(LendingError::ItemUnavailable(_))
        ));

        let ops: Vec<AuditOperation> = fx
            .coordinator
            .audit_trail(item.id())
            .unwrap()
            .iter()
            .map(|r| r.operation)
            .collect();
        assert_eq!(
            ops,
            vec![
                AuditOperation::Create,
                AuditOperation::Update,
                AuditOperation::Update,
                AuditOperation::Delete,
            ]
        );
    }

    #[tokio::test]
    async fn every_mutation_has_one_matching_audit_record() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(2).await;

        let a = fx.borrow(&member, &item).await.unwrap();
        let b = fx.borrow(&member, &item).await.unwrap();
        fx.give_back(&a).await.unwrap();
        fx.give_back(&b).await.unwrap();

        let records = fx.coordinator.audit_trail(item.id()).unwrap();
        assert_eq!(records.len(), 5);
        let availability: Vec<u32> = records
            .iter()
            .map(|r| r.new.map(|s| s.available_copies).unwrap_or_default())
            .collect();
        assert_eq!(availability, vec![2, 1, 0, 1, 2]);
        assert!(records.iter().all(|r| r.actor == desk()));

        let final_state = fx.coordinator.item(item.id()).unwrap();
        assert_eq!(
            records.last().and_then(|r| r.new),
            Some(lend_audit::ItemSnapshot::from(&final_state))
        );
        assert!(fx.coordinator.verify_audit_trail().unwrap().is_valid());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_borrows_respect_copy_count() {
        let fx = Fixture::new();
        let item = fx.item(8).await;
        let mut members = Vec::new();
        for _ in 0..10 {
            members.push(fx.member().await);
        }

        let mut handles = Vec::new();
        for member in &members {
            let coordinator = fx.coordinator.clone();
            let request = BorrowRequest::new(member.id(), item.id(), Actor::Member(member.id()));
            handles.push(tokio::spawn(async move { coordinator.borrow(request).await }));
        }

        let mut lent = 0;
        let mut unavailable = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => lent += 1,
                Err(LendingError::ItemUnavailable(_)) => unavailable += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(lent, 8);
        assert_eq!(unavailable, 2);
        assert_eq!(fx.available(&item), 0);
        assert_eq!(fx.store.loans().unwrap().len(), 8);
        assert!(fx.coordinator.verify_audit_trail().unwrap().is_valid());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_borrow_return_cycles_keep_inventory_whole() {
        let fx = Fixture::new();
        let item = fx.item(2).await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let member = fx.member().await;
            let coordinator = fx.coordinator.clone();
            let item_id = item.id();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let request = BorrowRequest::new(member.id(), item_id, Actor::System);
                    if let Ok(loan) = coordinator.borrow(request).await {
                        coordinator
                            .return_loan(ReturnRequest::new(loan.id(), Actor::System))
                            .await
                            .unwrap();
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let final_state = fx.coordinator.item(item.id()).unwrap();
        assert_eq!(final_state.available_copies(), 2);
        assert!(final_state.check_invariant().is_ok());
        let report = fx.coordinator.verify_audit_trail().unwrap();
        assert!(report.is_valid(), "{:?}", report.violations);
    }

    #[tokio::test]
    async fn cancelled_borrow_leaves_no_trace() {
        let fx = Fixture::new();
        let member = fx.member().await;
        let item = fx.item(1).await;
        let request = BorrowRequest::new(member.id(), item.id(), desk());

        let held = fx.store.begin().await.unwrap();
        let attempt = tokio::time::timeout(
            StdDuration::from_millis(20),
            fx.coordinator.borrow(request.clone()),
        )
        .await;
        assert!(attempt.is_err());
        drop(held);

        assert_eq!(fx.available(&item), 1);
        assert!(fx.store.loans().unwrap().is_empty());
        fx.coordinator.borrow(request).await.unwrap();
        assert_eq!(fx.available(&item), 0);
    }

    #[tokio::test]
    async fn lock_timeout_is_retryable() {
        let fx = Fixture::with_store(InMemoryLendingStore::with_config(
            StoreConfig::with_lock_timeout(StdDuration::from_millis(10)),
        ));
        let member = fx.member().await;
        let item = fx.item(1).await;

        let held = fx.store.begin().await.unwrap();
        let err = fx.borrow(&member, &item).await.unwrap_err();
        assert!(matches!(
            err,
            LendingError::Store(StoreError::LockTimeout { .. })
        ));
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());
        drop(held);

        fx.borrow(&member, &item).await.unwrap();
    }
}
