//! Inventory ledger for the lending core.
//!
//! [`InventoryLedger`] is the only code that changes a catalog item's copy
//! counts. Each operation runs inside a caller-supplied store transaction and
//! appends exactly one audit entry per mutation to the same transaction.

pub mod error;
pub mod ledger;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{CopyReturn, InventoryLedger};
