//! Lending policy for the lending core.
//!
//! Policy constants (loan period, renewal limits, late-fee rate, member fee
//! ceiling) are supplied from outside rather than hard-coded. Every field
//! has a documented default and a policy file may override any subset.

pub mod config;
pub mod error;

pub use config::{LendingPolicy, MAX_PERIOD_DAYS};
pub use error::{PolicyError, PolicyResult};
