//! Multicast fan-out hub for one interest key.
//!
//! A [`Broadcaster`] delivers each emitted change event to every currently
//! attached consumer. There is no history buffer: attaching never replays
//! events emitted before attachment. Per-consumer delivery order matches
//! emission order (each consumer has its own FIFO channel); order across
//! distinct consumers is unspecified.
//!
//! Closure is driven only by the registry tearing down the owning key —
//! detaching the last consumer leaves the hub open, so a detach racing a
//! fresh attach on a still-needed key loses no events.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use feedmux_proto::ChangeEvent;

use crate::error::FeedError;

enum HubState {
    /// Accepting attachments and emissions.
    Live,
    /// Terminally failed; late attachments observe the error immediately.
    Failed(FeedError),
    /// Torn down by the registry.
    Closed,
}

struct Consumer {
    id: u64,
    tx: mpsc::UnboundedSender<Result<ChangeEvent, FeedError>>,
}

struct Inner {
    consumers: Vec<Consumer>,
    next_id: u64,
    state: HubState,
}

/// Replay-free multicast hub: one per registry entry.
pub struct Broadcaster {
    inner: Mutex<Inner>,
    /// Handed to streams so dropping one detaches it.
    self_ref: Weak<Broadcaster>,
}

impl Broadcaster {
    /// Create an empty, live hub.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            inner: Mutex::new(Inner {
                consumers: Vec::new(),
                next_id: 0,
                state: HubState::Live,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Attach a new consumer and return its live stream.
    ///
    /// The stream sees only events emitted after this call. Attaching to a
    /// failed hub yields the terminal error immediately; attaching to a
    /// closed hub yields an immediately-completed stream.
    pub fn attach(&self) -> FeedStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        match &inner.state {
            HubState::Live => inner.consumers.push(Consumer { id, tx }),
            HubState::Failed(error) => {
                // tx is dropped after the send, terminating the stream.
                let _ = tx.send(Err(error.clone()));
            }
            HubState::Closed => {}
        }

        FeedStream {
            id,
            rx,
            hub: self.self_ref.clone(),
        }
    }

    /// Deliver an event to every attached consumer.
    ///
    /// Consumers whose stream was dropped are pruned as a side effect.
    pub fn emit(&self, event: ChangeEvent) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, HubState::Live) {
            return;
        }
        inner
            .consumers
            .retain(|consumer| consumer.tx.send(Ok(event.clone())).is_ok());
    }

    /// Remove one consumer; other consumers are unaffected.
    pub fn detach(&self, id: u64) {
        self.inner.lock().consumers.retain(|c| c.id != id);
    }

    /// Complete every attached stream without an error and discard the
    /// consumer list. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, HubState::Live) {
            return;
        }
        // Dropping the senders completes each consumer stream.
        inner.consumers.clear();
        inner.state = HubState::Closed;
    }

    /// Deliver a terminal error to every attached stream and mark the hub
    /// failed. Idempotent; no-op after close.
    pub fn fail(&self, error: FeedError) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, HubState::Live) {
            return;
        }
        for consumer in inner.consumers.drain(..) {
            let _ = consumer.tx.send(Err(error.clone()));
        }
        inner.state = HubState::Failed(error);
    }

    /// Number of currently attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.inner.lock().consumers.len()
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = match inner.state {
            HubState::Live => "live",
            HubState::Failed(_) => "failed",
            HubState::Closed => "closed",
        };
        f.debug_struct("Broadcaster")
            .field("consumers", &inner.consumers.len())
            .field("state", &state)
            .finish()
    }
}

/// A consumer's live, cancellable view onto one interest key's events.
///
/// Yields `Ok(event)` for each delivered change event; a terminal
/// `Err(FeedError)` is the last item before completion when the key's
/// upstream binding failed. Dropping the stream detaches the consumer.
pub struct FeedStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<Result<ChangeEvent, FeedError>>,
    hub: Weak<Broadcaster>,
}

impl FeedStream {
    /// Receive the next item, waiting if none is pending.
    ///
    /// Returns `None` once the stream has completed (key torn down, or the
    /// terminal error already delivered).
    pub async fn recv(&mut self) -> Option<Result<ChangeEvent, FeedError>> {
        self.rx.recv().await
    }

    /// Receive a pending item without waiting.
    pub fn try_recv(&mut self) -> Option<Result<ChangeEvent, FeedError>> {
        self.rx.try_recv().ok()
    }

    /// Cancel this attachment. Equivalent to dropping the stream.
    pub fn detach(self) {}
}

impl Stream for FeedStream {
    type Item = Result<ChangeEvent, FeedError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for FeedStream {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}

impl fmt::Debug for FeedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedStream").field("id", &self.id).finish()
    }
}
