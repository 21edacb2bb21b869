use lend_model::{Loan, ReturnSummary};
use lend_types::{Actor, ItemId, LoanId, MemberId, Money, RequestId};
use serde::{Deserialize, Serialize};

/// A request to lend one copy of an item to a member.
///
/// The request id makes the borrow idempotent: submitting the same request
/// again after it committed fails with `AlreadyCompleted`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub request_id: RequestId,
    pub member_id: MemberId,
    pub item_id: ItemId,
    pub actor: Actor,
}

impl BorrowRequest {
    /// A borrow request with a fresh request id.
    pub fn new(member_id: MemberId, item_id: ItemId, actor: Actor) -> Self {
        Self {
            request_id: RequestId::new(),
            member_id,
            item_id,
            actor,
        }
    }
}

/// A request to close a loan by returning its copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub request_id: RequestId,
    pub loan_id: LoanId,
    pub actor: Actor,
}

impl ReturnRequest {
    pub fn new(loan_id: LoanId, actor: Actor) -> Self {
        Self {
            request_id: RequestId::new(),
            loan_id,
            actor,
        }
    }
}

/// Outcome of a committed return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub loan: Loan,
    pub summary: ReturnSummary,
    /// The member's fee balance after any late fee was charged.
    pub member_balance: Money,
    /// Set when every copy of the item was already on the shelf, so the
    /// return could not be counted. The loan still closed.
    pub inventory_discrepancy: bool,
}

/// Outcome of settling a loan's late fee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LateFeePayment {
    pub loan: Loan,
    pub paid: Money,
    pub member_balance: Money,
}
