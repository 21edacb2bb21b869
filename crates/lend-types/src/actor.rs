use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::MemberId;

/// The identity on whose behalf a mutation is performed.
///
/// Every audit record carries the actor that caused it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// Internal maintenance (migrations, scheduled jobs).
    System,
    /// A staff member at the circulation desk, identified by login name.
    Staff(String),
    /// A member acting for themselves (self-service kiosk, web).
    Member(MemberId),
}

impl Actor {
    /// Convenience constructor for staff actors.
    pub fn staff(name: impl Into<String>) -> Self {
        Self::Staff(name.into())
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Staff(name) => write!(f, "staff:{name}"),
            Self::Member(id) => write!(f, "member:{}", id.short_id()),
        }
    }
}
