//! Unit of work lifecycle.

use serde::{Deserialize, Serialize};

/// The state of a unit of work.
///
/// State transitions:
/// ```text
/// (factory) ──begin──► Open ──┬──► Committed ──┐
///                             │                ├──► (dropped)
///                             └──► RolledBack ─┘
/// ```
///
/// A unit of work that has not been begun does not exist yet, and a closed
/// one has been consumed or dropped, so neither has a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UowState {
    /// Reads and writes are allowed; nothing is durable yet.
    #[default]
    Open,

    /// All tracked changes were made durable.
    Committed,

    /// All tracked changes were discarded.
    RolledBack,
}

impl UowState {
    /// Returns true if the repository may still be used.
    pub fn is_open(&self) -> bool {
        matches!(self, UowState::Open)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            UowState::Open => "Open",
            UowState::Committed => "Committed",
            UowState::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for UowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
