//! Control messages exchanged with a remote change store.
//!
//! The control plane is a request/response exchange: a client says hello,
//! then opens and closes named change subscriptions. Data-plane records
//! ([`crate::change::RawChange`]) arrive on a separate push channel keyed by
//! the topic the store hands back at subscribe time.

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// Client hello sent when establishing a control connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub protocol_version: u32,
    /// Client identifier (for logging and debugging).
    pub client_id: String,
}

impl Hello {
    /// Create a hello with the current protocol version.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// Request to open a change subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeCommand {
    /// Channel name the subscription is opened under.
    pub channel: String,
    /// Table to watch.
    pub table: String,
    /// Event kind to watch ("*" for every kind).
    pub kind: EventKind,
    /// Optional opaque row filter expression, evaluated by the store.
    pub filter: Option<String>,
}

impl SubscribeCommand {
    /// Create a subscribe command watching every event kind.
    pub fn new(channel: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            table: table.into(),
            kind: EventKind::Any,
            filter: None,
        }
    }

    /// Restrict the subscription to one event kind.
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a row filter expression.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// A control request from client to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// Establish the control session.
    Hello(Hello),
    /// Open a change subscription.
    Subscribe(SubscribeCommand),
    /// Close a previously opened subscription.
    Unsubscribe {
        /// The subscription to close.
        subscription_id: u64,
    },
}

impl ControlRequest {
    /// Create a hello request.
    pub fn hello(client_id: impl Into<String>) -> Self {
        ControlRequest::Hello(Hello::new(client_id))
    }
}

/// A control response from store to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlResponse {
    /// Hello accepted.
    Welcome {
        /// Protocol version the store will speak on this session.
        protocol_version: u32,
        /// Store identifier.
        server_id: String,
    },
    /// Subscription opened.
    Subscribed {
        /// Identifier for later unsubscribe.
        subscription_id: u64,
        /// Topic the store publishes this subscription's records on.
        topic: String,
    },
    /// Subscription closed.
    Unsubscribed,
    /// The request was rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ControlResponse {
    /// Create a welcome response.
    pub fn welcome(protocol_version: u32, server_id: impl Into<String>) -> Self {
        ControlResponse::Welcome {
            protocol_version,
            server_id: server_id.into(),
        }
    }

    /// Create a subscribed response.
    pub fn subscribed(subscription_id: u64, topic: impl Into<String>) -> Self {
        ControlResponse::Subscribed {
            subscription_id,
            topic: topic.into(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            message: message.into(),
        }
    }
}

/// Check whether a peer protocol version is compatible with ours.
pub fn is_version_compatible(client_version: u32, server_version: u32) -> bool {
    // Exact match for now; negotiation can relax this later.
    client_version == server_version
}
