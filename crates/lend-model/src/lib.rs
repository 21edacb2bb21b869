//! Domain model for the lending core.
//!
//! - [`CatalogItem`]: a lendable title with total and available copy counts
//! - [`Member`]: a borrower with an activity flag, expiry, and fee balance
//! - [`eligibility`]: the borrow gate evaluated before any loan is opened
//! - [`Loan`]: one borrowing transaction and its state machine
//!
//! Each entity has two construction paths: a validating constructor for new
//! entities and `rehydrate` for state loaded from trusted storage.

pub mod eligibility;
pub mod error;
pub mod item;
pub mod loan;
pub mod member;

pub use eligibility::{assess, can_borrow, Ineligibility};
pub use error::{DomainError, DomainResult, RenewalRefusal};
pub use item::{CatalogItem, ItemParts};
pub use loan::{Loan, LoanParts, LoanStatus, ReturnSummary};
pub use member::{Member, MemberParts};
