//! Persistence boundary for the lending core.
//!
//! [`LendingStore`] hands out [`StoreTransaction`]s. A transaction stages
//! every write locally and applies them all at [`StoreTransaction::commit`],
//! or none of them when it is dropped. Commit refuses a write-set in which a
//! catalog item mutation has no matching audit entry.
//!
//! [`InMemoryLendingStore`] is the reference implementation.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryLendingStore;
pub use traits::{CommitSummary, CopyChange, CopyUpdate, FeeAdjustment, LendingStore, StoreTransaction};
