//! Upstream binding: the one live remote subscription for an interest key.
//!
//! Opening is asynchronous: the binding is usable immediately while a
//! spawned task performs the remote handshake, then drains the source's
//! record channel, normalizing each record and forwarding it to the paired
//! broadcaster. One record in, at most one event out — never buffered,
//! never coalesced.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use feedmux_proto::{ChangeEvent, InterestKey};

use crate::broadcast::Broadcaster;
use crate::error::FeedError;
use crate::source::{ChangeSource, SourceError, SubscribeRequest};
use crate::stats::FeedStats;

/// Lifecycle of an upstream binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Remote handshake in flight.
    Opening,
    /// Subscribed; records are being forwarded.
    Open,
    /// Close requested; remote handle not yet released.
    Closing,
    /// Remote handle released.
    Closed,
}

/// Owns the remote subscription handle for one interest key.
pub struct Binding {
    key: InterestKey,
    state: Arc<Mutex<BindingState>>,
    shutdown: watch::Sender<bool>,
}

impl Binding {
    /// Start opening a remote subscription for `key`.
    ///
    /// Returns without blocking; the handshake runs on a spawned task. On
    /// handshake failure — or if the upstream later ends the subscription
    /// unasked — `on_failure` is invoked exactly once with the terminal
    /// error. A close requested through [`Binding::close`] never triggers
    /// the hook.
    pub(crate) fn open(
        key: InterestKey,
        source: Arc<dyn ChangeSource>,
        broadcaster: Arc<Broadcaster>,
        stats: Arc<FeedStats>,
        on_failure: impl FnOnce(FeedError) + Send + 'static,
    ) -> Self {
        let state = Arc::new(Mutex::new(BindingState::Opening));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(run(
            key.clone(),
            source,
            broadcaster,
            stats,
            Arc::clone(&state),
            shutdown_rx,
            on_failure,
        ));

        Self {
            key,
            state,
            shutdown,
        }
    }

    /// Request release of the remote subscription handle.
    ///
    /// Idempotent: closing an already-closing or closed binding is a no-op.
    /// Never blocks; if the handshake is still in flight the handle is
    /// released as soon as it resolves.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                BindingState::Closing | BindingState::Closed => return,
                BindingState::Opening | BindingState::Open => *state = BindingState::Closing,
            }
        }
        let _ = self.shutdown.send(true);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BindingState {
        *self.state.lock()
    }

    /// The interest key this binding serves.
    pub fn key(&self) -> &InterestKey {
        &self.key
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key.to_string())
            .field("state", &self.state())
            .finish()
    }
}

/// Handshake, forward loop, and handle release for one binding.
async fn run(
    key: InterestKey,
    source: Arc<dyn ChangeSource>,
    broadcaster: Arc<Broadcaster>,
    stats: Arc<FeedStats>,
    state: Arc<Mutex<BindingState>>,
    mut shutdown: watch::Receiver<bool>,
    on_failure: impl FnOnce(FeedError) + Send + 'static,
) {
    let request = SubscribeRequest::from_key(&key);
    let mut subscription = match source.open(request).await {
        Ok(subscription) => subscription,
        Err(error) => {
            stats.record_open_failure();
            *state.lock() = BindingState::Closed;
            warn!(key = %key, error = %error, "remote subscription open failed");
            on_failure(FeedError::open_failed(error));
            return;
        }
    };

    // Close may have been requested while the handshake was in flight; the
    // handle still has to be released.
    let opened = {
        let mut state = state.lock();
        if *state == BindingState::Opening {
            *state = BindingState::Open;
            true
        } else {
            false
        }
    };
    if !opened {
        let _ = source.close(subscription.handle).await;
        *state.lock() = BindingState::Closed;
        return;
    }

    stats.record_binding_opened();
    debug!(key = %key, "upstream binding open");

    let disconnect = loop {
        tokio::select! {
            // Fires on a requested close, or when the binding itself has
            // been dropped (registry gone).
            _ = shutdown.changed() => break None,
            raw = subscription.changes.recv() => match raw {
                Some(raw) => match ChangeEvent::from_raw(raw) {
                    Ok(event) => {
                        stats.record_event_forwarded();
                        broadcaster.emit(event);
                    }
                    Err(error) => {
                        stats.record_malformed_dropped();
                        warn!(key = %key, error = %error, "dropping malformed change record");
                    }
                },
                None => break Some(FeedError::disconnected(SourceError::Closed)),
            },
        }
    };

    let _ = source.close(subscription.handle).await;
    *state.lock() = BindingState::Closed;

    match disconnect {
        Some(error) => {
            warn!(key = %key, "upstream ended subscription");
            on_failure(error);
        }
        None => debug!(key = %key, "upstream binding closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use crate::source::{SourceHandle, SourceSubscription};
    use async_trait::async_trait;
    use feedmux_proto::{ChangeType, RawChange, Row};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Notify;

    fn row(n: u64) -> Row {
        let mut row = Row::new();
        row.insert("n".into(), n.into());
        row
    }

    async fn open_binding(
        source: &Arc<MemorySource>,
        broadcaster: &Arc<Broadcaster>,
    ) -> (Binding, Arc<FeedStats>) {
        let stats = Arc::new(FeedStats::default());
        let binding = Binding::open(
            InterestKey::new("g", "t", feedmux_proto::EventKind::Any, None),
            Arc::clone(source) as Arc<dyn ChangeSource>,
            Arc::clone(broadcaster),
            Arc::clone(&stats),
            |_| {},
        );
        source.wait_for_subscriptions(1).await;
        (binding, stats)
    }

    #[tokio::test]
    async fn test_forwards_normalized_events() {
        let source = Arc::new(MemorySource::new());
        let broadcaster = Broadcaster::new();
        let mut stream = broadcaster.attach();
        let (binding, stats) = open_binding(&source, &broadcaster).await;

        source.publish(RawChange::insert("t", row(1)));

        let event = stream.recv().await.unwrap().unwrap();
        assert_eq!(event.change_type, ChangeType::Insert);
        assert_eq!(event.after.unwrap()["n"], 1);
        assert_eq!(stats.events_forwarded(), 1);

        binding.close();
    }

    #[tokio::test]
    async fn test_malformed_record_dropped_without_breaking_feed() {
        let source = Arc::new(MemorySource::new());
        let broadcaster = Broadcaster::new();
        let mut stream = broadcaster.attach();
        let (binding, stats) = open_binding(&source, &broadcaster).await;

        source.publish(RawChange::insert("t", row(1)));
        source.publish(RawChange {
            event: "GARBAGE".into(),
            table: "t".into(),
            before: None,
            after: None,
        });
        source.publish(RawChange::insert("t", row(2)));

        let first = stream.recv().await.unwrap().unwrap();
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(first.after.unwrap()["n"], 1);
        assert_eq!(second.after.unwrap()["n"], 2);
        assert_eq!(stats.malformed_dropped(), 1);
        assert_eq!(stats.events_forwarded(), 2);

        binding.close();
    }

    #[tokio::test]
    async fn test_close_releases_handle_and_is_idempotent() {
        let source = Arc::new(MemorySource::new());
        let broadcaster = Broadcaster::new();
        let (binding, _stats) = open_binding(&source, &broadcaster).await;
        assert_eq!(source.active_count(), 1);

        binding.close();
        binding.close(); // no-op

        source.wait_for_subscriptions(0).await;
        assert_eq!(source.active_count(), 0);
        assert_eq!(binding.state(), BindingState::Closed);
    }

    #[tokio::test]
    async fn test_open_failure_invokes_hook() {
        let source = Arc::new(MemorySource::new());
        source.reject_channel("g", "over quota");
        let broadcaster = Broadcaster::new();
        let stats = Arc::new(FeedStats::default());
        let failed = Arc::new(Notify::new());
        let observed = Arc::clone(&failed);

        let _binding = Binding::open(
            InterestKey::new("g", "t", feedmux_proto::EventKind::Any, None),
            Arc::clone(&source) as Arc<dyn ChangeSource>,
            broadcaster,
            Arc::clone(&stats),
            move |error| {
                assert!(matches!(error, FeedError::OpenFailed(_)));
                observed.notify_one();
            },
        );

        failed.notified().await;
        assert_eq!(stats.open_failures(), 1);
        assert_eq!(source.open_count(), 0);
    }

    /// Source whose handshake stalls until released, for close-while-opening.
    struct StallingSource {
        release: Notify,
        closed: AtomicU64,
        done: Notify,
    }

    #[async_trait]
    impl ChangeSource for StallingSource {
        async fn open(&self, _request: SubscribeRequest) -> Result<SourceSubscription, SourceError> {
            self.release.notified().await;
            let (_tx, changes) = tokio::sync::mpsc::unbounded_channel();
            Ok(SourceSubscription {
                handle: SourceHandle::new(1),
                changes,
            })
        }

        async fn close(&self, _handle: SourceHandle) -> Result<(), SourceError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_during_opening_releases_handle_after_handshake() {
        let source = Arc::new(StallingSource {
            release: Notify::new(),
            closed: AtomicU64::new(0),
            done: Notify::new(),
        });
        let broadcaster = Broadcaster::new();
        let binding = Binding::open(
            InterestKey::new("g", "t", feedmux_proto::EventKind::Any, None),
            Arc::clone(&source) as Arc<dyn ChangeSource>,
            broadcaster,
            Arc::new(FeedStats::default()),
            |_| panic!("close must not report failure"),
        );

        assert_eq!(binding.state(), BindingState::Opening);
        binding.close();
        assert_eq!(binding.state(), BindingState::Closing);

        // Let the handshake finish; the handle must be released promptly.
        source.release.notify_one();
        source.done.notified().await;
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_hangup_reports_disconnect() {
        let source = Arc::new(MemorySource::new());
        let broadcaster = Broadcaster::new();
        let stats = Arc::new(FeedStats::default());
        let failed = Arc::new(Notify::new());
        let observed = Arc::clone(&failed);

        let _binding = Binding::open(
            InterestKey::new("g", "t", feedmux_proto::EventKind::Any, None),
            Arc::clone(&source) as Arc<dyn ChangeSource>,
            broadcaster,
            stats,
            move |error| {
                assert!(matches!(error, FeedError::Disconnected(_)));
                observed.notify_one();
            },
        );

        source.wait_for_subscriptions(1).await;
        source.terminate_channel("g");
        failed.notified().await;
    }
}
