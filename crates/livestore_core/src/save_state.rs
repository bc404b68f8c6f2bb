//! Persistence status of an entity relative to its transaction.

use std::fmt;

/// Where an entity stands between creation and its last commit.
///
/// ```text
/// Fresh ──register──▶ Registered ──commit/rollback──▶ Saved
///                                                      │  ▲
///                                           mark_dirty │  │ commit/rollback
///                                                      ▼  │
///                                                     Dirty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveState {
    /// Constructed but not yet known to any transaction.
    Fresh,
    /// New in the current transaction; persisted through its owner.
    Registered,
    /// In sync with the last commit.
    Saved,
    /// Modified in the current transaction; stored explicitly at commit.
    Dirty,
}

impl SaveState {
    /// Whether the entity belongs to the current transaction's registered set.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Registered | Self::Dirty)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fresh => "fresh",
            Self::Registered => "registered",
            Self::Saved => "saved",
            Self::Dirty => "dirty",
        };
        f.write_str(name)
    }
}
