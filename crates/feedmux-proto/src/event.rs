//! Event kind enums.
//!
//! Two closed enums cover the two sides of the system: [`ChangeType`] is the
//! kind carried by a normalized change event (never a wildcard), and
//! [`EventKind`] is the kind a caller registers interest in (may be
//! [`EventKind::Any`]). Keeping them separate makes normalization exhaustive
//! at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of change carried by a normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// A new row was inserted.
    Insert,
    /// An existing row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl ChangeType {
    /// Wire spelling of this change type.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ChangeType::Insert => "INSERT",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Insert => "insert",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        };
        f.write_str(name)
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    /// Parse a wire event kind, case-insensitively.
    ///
    /// The wildcard spelling `"*"` is valid in subscription requests but
    /// never in a change record, so it is rejected here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Err(Error::WildcardEvent);
        }
        if s.eq_ignore_ascii_case("insert") {
            Ok(ChangeType::Insert)
        } else if s.eq_ignore_ascii_case("update") {
            Ok(ChangeType::Update)
        } else if s.eq_ignore_ascii_case("delete") {
            Ok(ChangeType::Delete)
        } else {
            Err(Error::UnknownEventKind(s.to_string()))
        }
    }
}

/// Kind of change a subscription is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Only inserts.
    Insert,
    /// Only updates.
    Update,
    /// Only deletes.
    Delete,
    /// Every change kind.
    #[serde(rename = "*")]
    Any,
}

impl EventKind {
    /// Check whether an event of the given change type satisfies this interest.
    pub fn matches(&self, change_type: ChangeType) -> bool {
        match self {
            EventKind::Any => true,
            EventKind::Insert => change_type == ChangeType::Insert,
            EventKind::Update => change_type == ChangeType::Update,
            EventKind::Delete => change_type == ChangeType::Delete,
        }
    }

    /// Wire spelling of this interest kind.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::Any => "*",
        }
    }
}

impl From<ChangeType> for EventKind {
    fn from(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::Insert => EventKind::Insert,
            ChangeType::Update => EventKind::Update,
            ChangeType::Delete => EventKind::Delete,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
