//! Foundation types for the lending core.
//!
//! Every other `lend-*` crate depends on `lend-types`.
//!
//! # Key Types
//!
//! - [`ItemId`], [`MemberId`], [`LoanId`]: UUID v7 entity identifiers
//! - [`RequestId`]: caller-chosen idempotency key for borrow/return requests
//! - [`Money`]: non-negative two-decimal currency amount
//! - [`Actor`]: who performed a mutation (recorded in the audit trail)
//! - [`Clock`]: time source, with [`SystemClock`] and [`ManualClock`]

pub mod actor;
pub mod clock;
pub mod error;
pub mod ids;
pub mod money;

pub use actor::Actor;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use ids::{ItemId, LoanId, MemberId, RequestId};
pub use money::Money;

/// Re-exported so downstream crates agree on one timestamp type.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
