//! Lending transaction coordinator.
//!
//! [`LendingCoordinator`] runs every lending workflow as one store
//! transaction: borrow, return, renewals, fee payments, and member and item
//! administration. A workflow either commits all of its effects or none.
//!
//! ```ignore
//! let coordinator = LendingCoordinator::new(store, policy, clock);
//! let loan = coordinator.borrow(BorrowRequest::new(member, item, Actor::System)).await?;
//! let receipt = coordinator.return_loan(ReturnRequest::new(loan.id(), Actor::System)).await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod request;

pub use coordinator::LendingCoordinator;
pub use error::{ErrorClass, LendingError, LendingResult};
pub use request::{BorrowRequest, LateFeePayment, ReturnReceipt, ReturnRequest};
