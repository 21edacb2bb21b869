use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a lending store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Longest a caller waits in [`begin`](crate::LendingStore::begin)
    /// before giving up with a transient lock timeout.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }
}
