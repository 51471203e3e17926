//! In-process change source.
//!
//! [`MemorySource`] emulates a remote change store inside the process:
//! published records are routed to every open subscription whose table and
//! event kind match. It backs the test suites and is useful for embedders
//! that want the multiplexer's fan-out semantics without a remote store.
//!
//! Row filters are accepted but not evaluated — they are opaque to the
//! multiplexer and a real store applies them server-side. Records whose
//! event kind does not parse are delivered as-is so the binding's
//! normalization path sees them.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use feedmux_proto::{ChangeType, RawChange};

use crate::source::{
    ChangeSource, SourceError, SourceHandle, SourceSubscription, SubscribeRequest,
};

struct OpenSubscription {
    request: SubscribeRequest,
    tx: mpsc::UnboundedSender<RawChange>,
}

impl OpenSubscription {
    fn matches(&self, raw: &RawChange) -> bool {
        if self.request.table != raw.table {
            return false;
        }
        match raw.event.parse::<ChangeType>() {
            Ok(change_type) => self.request.kind.matches(change_type),
            // Unparseable kinds pass through; normalization deals with them.
            Err(_) => true,
        }
    }
}

/// An in-process [`ChangeSource`].
#[derive(Default)]
pub struct MemorySource {
    subscriptions: DashMap<u64, OpenSubscription>,
    rejections: DashMap<String, String>,
    next_handle: AtomicU64,
    opened: AtomicU64,
    changed: Notify,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future open on `channel` fail with the given reason.
    pub fn reject_channel(&self, channel: impl Into<String>, reason: impl Into<String>) {
        self.rejections.insert(channel.into(), reason.into());
    }

    /// Stop rejecting opens on `channel`.
    pub fn allow_channel(&self, channel: &str) {
        self.rejections.remove(channel);
    }

    /// Route a record to every matching open subscription.
    ///
    /// Returns the number of subscriptions it was delivered to.
    pub fn publish(&self, raw: RawChange) -> usize {
        let mut delivered = 0;
        for subscription in self.subscriptions.iter() {
            if subscription.matches(&raw) && subscription.tx.send(raw.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every open subscription on `channel`, emulating a remote
    /// hang-up: each affected binding observes its record channel ending.
    pub fn terminate_channel(&self, channel: &str) {
        self.subscriptions
            .retain(|_, subscription| subscription.request.channel != channel);
        self.changed.notify_waiters();
    }

    /// Total subscriptions ever opened successfully.
    pub fn open_count(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Currently open subscriptions.
    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Wait until exactly `count` subscriptions are open.
    ///
    /// Opens are asynchronous from the registry caller's point of view, so
    /// tests use this to synchronize before publishing.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        loop {
            if self.subscriptions.len() == count {
                return;
            }
            let changed = self.changed.notified();
            if self.subscriptions.len() == count {
                return;
            }
            changed.await;
        }
    }

    /// Wait until at least `count` subscriptions have ever been opened.
    ///
    /// Distinguishes a freshly opened subscription from a predecessor that
    /// has not finished closing yet, which a bare active count cannot.
    pub async fn wait_for_opens(&self, count: u64) {
        loop {
            if self.open_count() >= count {
                return;
            }
            let changed = self.changed.notified();
            if self.open_count() >= count {
                return;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl ChangeSource for MemorySource {
    async fn open(&self, request: SubscribeRequest) -> Result<SourceSubscription, SourceError> {
        if let Some(reason) = self.rejections.get(&request.channel) {
            return Err(SourceError::Rejected(reason.value().clone()));
        }

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, changes) = mpsc::unbounded_channel();
        self.subscriptions.insert(id, OpenSubscription { request, tx });
        self.opened.fetch_add(1, Ordering::Relaxed);
        self.changed.notify_waiters();

        Ok(SourceSubscription {
            handle: SourceHandle::new(id),
            changes,
        })
    }

    async fn close(&self, handle: SourceHandle) -> Result<(), SourceError> {
        self.subscriptions.remove(&handle.id());
        self.changed.notify_waiters();
        Ok(())
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("active", &self.active_count())
            .field("opened", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedmux_proto::{EventKind, Row};

    fn request(channel: &str, table: &str, kind: EventKind) -> SubscribeRequest {
        SubscribeRequest::new(channel, table).with_kind(kind)
    }

    #[tokio::test]
    async fn test_publish_routes_by_table_and_kind() {
        let source = MemorySource::new();
        let mut inserts = source
            .open(request("g", "messages", EventKind::Insert))
            .await
            .unwrap();
        let mut any = source
            .open(request("g", "messages", EventKind::Any))
            .await
            .unwrap();
        let mut other_table = source
            .open(request("g", "threads", EventKind::Any))
            .await
            .unwrap();

        let delivered = source.publish(RawChange::insert("messages", Row::new()));
        assert_eq!(delivered, 2);

        assert!(inserts.changes.try_recv().is_ok());
        assert!(any.changes.try_recv().is_ok());
        assert!(other_table.changes.try_recv().is_err());

        let delivered = source.publish(RawChange::delete("messages", Row::new()));
        assert_eq!(delivered, 1);
        assert!(inserts.changes.try_recv().is_err());
        assert!(any.changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unparseable_kind_is_delivered() {
        let source = MemorySource::new();
        let mut subscription = source
            .open(request("g", "messages", EventKind::Insert))
            .await
            .unwrap();

        source.publish(RawChange {
            event: "???".into(),
            table: "messages".into(),
            before: None,
            after: None,
        });
        assert!(subscription.changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_rejected_channel() {
        let source = MemorySource::new();
        source.reject_channel("g", "maintenance");

        let result = source.open(request("g", "messages", EventKind::Any)).await;
        assert!(matches!(result, Err(SourceError::Rejected(reason)) if reason == "maintenance"));
        assert_eq!(source.open_count(), 0);

        source.allow_channel("g");
        assert!(source
            .open(request("g", "messages", EventKind::Any))
            .await
            .is_ok());
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_subscription() {
        let source = MemorySource::new();
        let subscription = source
            .open(request("g", "messages", EventKind::Any))
            .await
            .unwrap();
        assert_eq!(source.active_count(), 1);

        source.close(subscription.handle).await.unwrap();
        assert_eq!(source.active_count(), 0);

        // Closing an already-released handle is a no-op.
        source.close(subscription.handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_channel_ends_record_streams() {
        let source = MemorySource::new();
        let mut subscription = source
            .open(request("g", "messages", EventKind::Any))
            .await
            .unwrap();

        source.terminate_channel("g");
        assert_eq!(source.active_count(), 0);
        assert!(subscription.changes.recv().await.is_none());
    }
}
