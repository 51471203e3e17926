//! The upstream change-source capability.
//!
//! A [`ChangeSource`] is the seam between the multiplexer and the remote
//! data store: it opens a named change subscription and hands back a
//! single-producer channel of raw records, decoupling the transport's
//! callback semantics from the consumer-facing stream abstraction. The
//! multiplexer guarantees it opens at most one subscription per distinct
//! interest key; a source does not need to de-duplicate.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use feedmux_proto::{EventKind, InterestKey, RawChange};

/// Transport-level failures reported by a change source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store refused the subscription.
    #[error("subscription rejected: {0}")]
    Rejected(String),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The source or subscription is closed.
    #[error("source closed")]
    Closed,
}

/// Opaque identifier for one open remote subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(u64);

impl SourceHandle {
    /// Create a handle from a source-assigned id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The source-assigned id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Parameters for opening one remote change subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Channel name the subscription is opened under.
    pub channel: String,
    /// Table to watch.
    pub table: String,
    /// Event kind to watch.
    pub kind: EventKind,
    /// Optional opaque row filter, evaluated by the store.
    pub filter: Option<String>,
}

impl SubscribeRequest {
    /// Create a request watching every event kind on a table.
    pub fn new(channel: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            table: table.into(),
            kind: EventKind::Any,
            filter: None,
        }
    }

    /// Restrict the request to one event kind.
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a row filter expression.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Build the request for an interest key: the key's group becomes the
    /// channel name.
    pub fn from_key(key: &InterestKey) -> Self {
        Self {
            channel: key.group().to_string(),
            table: key.table().to_string(),
            kind: key.kind(),
            filter: key.filter().map(str::to_string),
        }
    }
}

/// One open remote subscription: the handle for later close plus the channel
/// the transport feeds raw records into.
#[derive(Debug)]
pub struct SourceSubscription {
    /// Handle to release the subscription.
    pub handle: SourceHandle,
    /// Raw records, in upstream arrival order.
    pub changes: mpsc::UnboundedReceiver<RawChange>,
}

/// Capability to open and close remote change subscriptions.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Open a remote subscription.
    ///
    /// Resolves once the remote handshake completes. Delivery of records
    /// begins only after the returned channel exists, so no record is lost
    /// between handshake and first receive.
    async fn open(&self, request: SubscribeRequest) -> Result<SourceSubscription, SourceError>;

    /// Release a remote subscription.
    ///
    /// Closing a handle that is already released is not an error.
    async fn close(&self, handle: SourceHandle) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_key() {
        let key = InterestKey::new(
            "chat",
            "messages",
            EventKind::Insert,
            Some("room=eq.7".into()),
        );
        let request = SubscribeRequest::from_key(&key);

        assert_eq!(request.channel, "chat");
        assert_eq!(request.table, "messages");
        assert_eq!(request.kind, EventKind::Insert);
        assert_eq!(request.filter.as_deref(), Some("room=eq.7"));
    }

    #[test]
    fn test_request_builder() {
        let request = SubscribeRequest::new("chat", "messages")
            .with_kind(EventKind::Delete)
            .with_filter("author=eq.3");

        assert_eq!(request.kind, EventKind::Delete);
        assert_eq!(request.filter.as_deref(), Some("author=eq.3"));
    }

    #[test]
    fn test_handle_identity() {
        assert_eq!(SourceHandle::new(7), SourceHandle::new(7));
        assert_ne!(SourceHandle::new(7), SourceHandle::new(8));
        assert_eq!(SourceHandle::new(7).id(), 7);
    }
}
