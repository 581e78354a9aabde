//! Saga instance status.

use serde::{Deserialize, Serialize};

/// The lifecycle status of a saga instance.
///
/// A saga stays `Active` until its handler marks it complete; committing
/// a `Completed` instance deletes its record and association entries,
/// after which the identifier is no longer resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// The saga is live and will receive further events.
    #[default]
    Active,

    /// The saga finished its work (terminal state).
    Completed,
}

impl SagaStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Active => "Active",
            SagaStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
