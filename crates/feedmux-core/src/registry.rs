//! The multiplexer registry.
//!
//! [`FeedRegistry`] maps each interest key to its one (binding, broadcaster)
//! pair. The first subscribe for a key opens the pair; every further
//! subscribe with an equal key attaches to the existing broadcaster, so at
//! most one upstream subscription is ever open per distinct key.
//!
//! The registry is an explicit instance: the composition root constructs it
//! once around a [`ChangeSource`] and hands out clones (clones share state).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use feedmux_proto::{EventKind, InterestKey};

use crate::binding::Binding;
use crate::broadcast::{Broadcaster, FeedStream};
use crate::error::FeedError;
use crate::source::ChangeSource;
use crate::stats::FeedStats;

struct FeedEntry {
    /// Unique per entry so a stale failure report from a replaced entry
    /// (same key, earlier generation) is ignored.
    id: u64,
    binding: Binding,
    broadcaster: Arc<Broadcaster>,
}

impl FeedEntry {
    fn close(self) {
        self.binding.close();
        self.broadcaster.close();
    }
}

struct RegistryInner {
    source: Arc<dyn ChangeSource>,
    entries: DashMap<InterestKey, FeedEntry>,
    next_entry_id: AtomicU64,
    stats: Arc<FeedStats>,
}

impl RegistryInner {
    fn open_entry(inner: &Arc<Self>, key: InterestKey) -> FeedEntry {
        let id = inner.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let broadcaster = Broadcaster::new();
        let registry = Arc::downgrade(inner);
        let failure_key = key.clone();

        let binding = Binding::open(
            key.clone(),
            Arc::clone(&inner.source),
            Arc::clone(&broadcaster),
            Arc::clone(&inner.stats),
            move |error| {
                if let Some(inner) = registry.upgrade() {
                    inner.entry_failed(&failure_key, id, error);
                }
            },
        );

        debug!(key = %key, entry = id, "opening change feed entry");
        FeedEntry {
            id,
            binding,
            broadcaster,
        }
    }

    /// Remove a failed entry and propagate the terminal error to its
    /// consumers. A later subscribe with the same key starts from scratch.
    fn entry_failed(&self, key: &InterestKey, entry_id: u64, error: FeedError) {
        match self.entries.remove_if(key, |_, entry| entry.id == entry_id) {
            Some((_, entry)) => {
                debug!(key = %key, entry = entry_id, "removing failed change feed entry");
                entry.binding.close();
                entry.broadcaster.fail(error);
            }
            None => debug!(key = %key, entry = entry_id, "ignoring failure for replaced entry"),
        }
    }

    fn teardown(&self, group: Option<&str>) {
        let keys: Vec<InterestKey> = self
            .entries
            .iter()
            .filter(|entry| group.map_or(true, |g| entry.key().group() == g))
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                debug!(key = %key, entry = entry.id, "tearing down change feed entry");
                entry.close();
            }
        }
    }
}

/// De-duplicating coordinator for change-feed subscriptions.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use feedmux_core::{FeedRegistry, MemorySource};
/// use feedmux_core::proto::EventKind;
///
/// let source = Arc::new(MemorySource::new());
/// let registry = FeedRegistry::new(source.clone());
///
/// // Two views share one upstream subscription.
/// let mut inbox = registry.subscribe("chat", "messages", EventKind::Insert, None);
/// let mut badge = registry.subscribe("chat", "messages", EventKind::Insert, None);
///
/// // The whole feature tears down as one group.
/// registry.unsubscribe("chat");
/// ```
#[derive(Clone)]
pub struct FeedRegistry {
    inner: Arc<RegistryInner>,
}

impl FeedRegistry {
    /// Create a registry multiplexing over the given source.
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                entries: DashMap::new(),
                next_entry_id: AtomicU64::new(1),
                stats: Arc::new(FeedStats::default()),
            }),
        }
    }

    /// Subscribe to an interest, reusing the upstream subscription if an
    /// equal interest is already live.
    ///
    /// Never blocks: the returned stream is usable immediately, and a
    /// failure to open the upstream binding arrives asynchronously as a
    /// terminal [`FeedError`] on the stream. Must be called within a tokio
    /// runtime; the remote handshake runs on a spawned task.
    pub fn subscribe(
        &self,
        group: &str,
        table: &str,
        kind: EventKind,
        filter: Option<&str>,
    ) -> FeedStream {
        let key = InterestKey::new(group, table, kind, filter.map(str::to_string));
        let inner = &self.inner;
        let entry = inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| RegistryInner::open_entry(inner, key));
        entry.broadcaster.attach()
    }

    /// Tear down every entry whose key's group equals `group`.
    ///
    /// Group-wide, not per-consumer: every consumer on a matching entry
    /// observes stream completion, however many subscribe calls produced
    /// them. Matching is exact equality on the group field.
    pub fn unsubscribe(&self, group: &str) {
        self.inner.teardown(Some(group));
    }

    /// Tear down every entry; used at application shutdown.
    pub fn unsubscribe_all(&self) {
        self.inner.teardown(None);
    }

    /// Number of live interest keys.
    pub fn active_feeds(&self) -> usize {
        self.inner.entries.len()
    }

    /// Number of consumers attached to the given interest, if it is live.
    pub fn consumer_count(
        &self,
        group: &str,
        table: &str,
        kind: EventKind,
        filter: Option<&str>,
    ) -> Option<usize> {
        let key = InterestKey::new(group, table, kind, filter.map(str::to_string));
        self.inner
            .entries
            .get(&key)
            .map(|entry| entry.broadcaster.consumer_count())
    }

    /// Lifecycle counters shared by this registry and its bindings.
    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.inner.stats)
    }
}

impl std::fmt::Debug for FeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRegistry")
            .field("active_feeds", &self.active_feeds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;

    #[tokio::test]
    async fn test_equal_keys_share_one_entry() {
        let source = Arc::new(MemorySource::new());
        let registry = FeedRegistry::new(source.clone());

        let _a = registry.subscribe("chat", "messages", EventKind::Insert, None);
        let _b = registry.subscribe("chat", "messages", EventKind::Insert, None);

        assert_eq!(registry.active_feeds(), 1);
        assert_eq!(
            registry.consumer_count("chat", "messages", EventKind::Insert, None),
            Some(2)
        );

        source.wait_for_subscriptions(1).await;
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_entries() {
        let source = Arc::new(MemorySource::new());
        let registry = FeedRegistry::new(source.clone());

        let _a = registry.subscribe("chat", "messages", EventKind::Insert, None);
        let _b = registry.subscribe("chat", "messages", EventKind::Delete, None);
        let _c = registry.subscribe("chat", "messages", EventKind::Insert, Some("room=eq.1"));

        assert_eq!(registry.active_feeds(), 3);
        source.wait_for_subscriptions(3).await;
        assert_eq!(source.open_count(), 3);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let source = Arc::new(MemorySource::new());
        let registry = FeedRegistry::new(source.clone());
        let clone = registry.clone();

        let _stream = registry.subscribe("chat", "messages", EventKind::Any, None);
        assert_eq!(clone.active_feeds(), 1);

        clone.unsubscribe("chat");
        assert_eq!(registry.active_feeds(), 0);
    }
}
