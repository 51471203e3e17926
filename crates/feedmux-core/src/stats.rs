//! Lifecycle counters for observability.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the registry and its bindings.
///
/// Monotonic over the lifetime of one registry; cheap to read at any time.
#[derive(Debug, Default)]
pub struct FeedStats {
    bindings_opened: AtomicU64,
    open_failures: AtomicU64,
    events_forwarded: AtomicU64,
    malformed_dropped: AtomicU64,
}

impl FeedStats {
    pub(crate) fn record_binding_opened(&self) {
        self.bindings_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open_failure(&self) {
        self.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_forwarded(&self) {
        self.events_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_dropped(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Upstream bindings that completed their handshake.
    pub fn bindings_opened(&self) -> u64 {
        self.bindings_opened.load(Ordering::Relaxed)
    }

    /// Upstream bindings whose handshake failed.
    pub fn open_failures(&self) -> u64 {
        self.open_failures.load(Ordering::Relaxed)
    }

    /// Change events forwarded to broadcasters.
    pub fn events_forwarded(&self) -> u64 {
        self.events_forwarded.load(Ordering::Relaxed)
    }

    /// Raw records dropped because they failed normalization.
    pub fn malformed_dropped(&self) -> u64 {
        self.malformed_dropped.load(Ordering::Relaxed)
    }

    /// Consistent-enough point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bindings_opened: self.bindings_opened(),
            open_failures: self.open_failures(),
            events_forwarded: self.events_forwarded(),
            malformed_dropped: self.malformed_dropped(),
        }
    }
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Upstream bindings that completed their handshake.
    pub bindings_opened: u64,
    /// Upstream bindings whose handshake failed.
    pub open_failures: u64,
    /// Change events forwarded to broadcasters.
    pub events_forwarded: u64,
    /// Raw records dropped because they failed normalization.
    pub malformed_dropped: u64,
}
