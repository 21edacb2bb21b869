use async_trait::async_trait;
use lend_audit::{AuditEntry, AuditHead, AuditReader};
use lend_model::{CatalogItem, Loan, Member};
use lend_types::{ItemId, LoanId, MemberId, Money, RequestId, Timestamp};

use crate::error::StoreResult;

/// Direction of a conditional copy-count update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyChange {
    /// Decrement `available` if the item is borrowable and `available > 0`.
    Take,
    /// Increment `available` if it is below `total`.
    Restore,
}

/// Outcome of a conditional copy-count update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CopyUpdate {
    /// No item with that id exists.
    Missing,
    /// The condition did not hold; nothing was staged.
    Unchanged(CatalogItem),
    /// The change was staged.
    Applied { before: CatalogItem, after: CatalogItem },
}

/// An atomic change to a member's fee balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeAdjustment {
    Charge(Money),
    Pay(Money),
}

/// What a successful commit wrote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    pub audit_records: usize,
    pub head: Option<AuditHead>,
}

/// A unit of work against a [`LendingStore`].
///
/// Reads see committed state overlaid with this transaction's own staged
/// writes. Nothing becomes visible to other readers until
/// [`commit`](Self::commit) returns `Ok`. Dropping an uncommitted
/// transaction discards every staged write.
///
/// Every catalog item mutation (`insert_item`, `update_item`, or an applied
/// conditional update) must be matched by one [`append_audit`](Self::append_audit)
/// for the same item, or commit fails.
pub trait StoreTransaction: Send {
    fn item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>>;

    /// Stage a new item. Fails if the id is taken.
    fn insert_item(&mut self, item: CatalogItem) -> StoreResult<()>;

    /// Stage a replacement for an existing item.
    fn update_item(&mut self, item: CatalogItem) -> StoreResult<()>;

    /// Compare-and-set on the available-copy count.
    ///
    /// The condition is evaluated and the change staged in one step, so two
    /// callers can never both take the last copy.
    fn conditional_update_available(
        &mut self,
        id: ItemId,
        change: CopyChange,
        at: Timestamp,
    ) -> StoreResult<CopyUpdate>;

    fn member(&self, id: MemberId) -> StoreResult<Option<Member>>;

    /// Stage a new or replacement member.
    fn put_member(&mut self, member: Member) -> StoreResult<()>;

    /// Apply a fee charge or payment and return the new balance.
    fn adjust_member_fees(&mut self, id: MemberId, adjustment: FeeAdjustment)
        -> StoreResult<Money>;

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>>;

    /// Stage a new or replacement loan.
    fn put_loan(&mut self, loan: Loan) -> StoreResult<()>;

    /// Every loan the member holds, staged loans included, oldest first.
    fn loans_for_member(&self, member: MemberId) -> StoreResult<Vec<Loan>>;

    /// Number of `Active` loans the member holds, staged loans included.
    fn active_loan_count(&self, member: MemberId) -> StoreResult<u32> {
        let active = self
            .loans_for_member(member)?
            .iter()
            .filter(|loan| loan.is_active())
            .count();
        Ok(u32::try_from(active).unwrap_or(u32::MAX))
    }

    /// Stage an audit entry. It is sealed into the trail at commit.
    fn append_audit(&mut self, entry: AuditEntry) -> StoreResult<()>;

    /// The loan a completed request produced, if the request was seen.
    fn completed_request(&self, id: RequestId) -> StoreResult<Option<LoanId>>;

    fn record_request(&mut self, id: RequestId, loan: LoanId) -> StoreResult<()>;

    /// Apply every staged write atomically.
    fn commit(self: Box<Self>) -> StoreResult<CommitSummary>;
}

/// Shared lending state.
///
/// The read methods see committed state only.
#[async_trait]
pub trait LendingStore: AuditReader {
    /// Start a write transaction, waiting at most the configured lock
    /// timeout for concurrent writers.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    fn item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>>;

    fn member(&self, id: MemberId) -> StoreResult<Option<Member>>;

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>>;

    fn items(&self) -> StoreResult<Vec<CatalogItem>>;

    fn loans(&self) -> StoreResult<Vec<Loan>>;

    /// Loans for one member, oldest first.
    fn loans_for_member(&self, member: MemberId) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .loans()?
            .into_iter()
            .filter(|loan| loan.member_id() == member)
            .collect();
        loans.sort_by_key(|loan| loan.borrowed_at());
        Ok(loans)
    }
}
