//! Interest keys.

use std::fmt;

use crate::event::EventKind;

/// Identity of one logical subscription.
///
/// An interest key is the tuple (group, table, event kind, row filter). Two
/// keys are equal iff all four fields are equal; the filter is compared as an
/// opaque string, never parsed. Keys are immutable and serve only as map
/// keys inside the registry.
///
/// The `group` is a caller-chosen channel name scoping teardown: every key
/// created under a group is torn down together by a group-wide unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterestKey {
    group: String,
    table: String,
    kind: EventKind,
    filter: Option<String>,
}

impl InterestKey {
    /// Create a new interest key.
    ///
    /// Pure and deterministic: equal inputs always yield equal keys.
    pub fn new(
        group: impl Into<String>,
        table: impl Into<String>,
        kind: EventKind,
        filter: Option<String>,
    ) -> Self {
        Self {
            group: group.into(),
            table: table.into(),
            kind,
            filter,
        }
    }

    /// The logical group (channel name) this key belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The table the subscription watches.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The event kind the subscription is interested in.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The opaque row filter expression, if any.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

impl fmt::Display for InterestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.group, self.table, self.kind)?;
        if let Some(filter) = &self.filter {
            write!(f, "?{filter}")?;
        }
        Ok(())
    }
}
