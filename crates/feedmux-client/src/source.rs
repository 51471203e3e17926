//! nng-backed change source.
//!
//! [`NngSource`] implements [`ChangeSource`] against a remote change store:
//! subscriptions are negotiated over the control socket, then each open
//! subscription gets its own Sub0 socket subscribed to the store-assigned
//! topic. A dedicated reader drains that socket, decodes each frame into a
//! raw record, and feeds the binding's channel.
//!
//! Sub0 sockets have no context-based async receive, so each reader is a
//! blocking thread; closing the socket unblocks it.

use async_trait::async_trait;
use dashmap::DashMap;
use nng::options::Options;
use nng::{Protocol, Socket};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use feedmux_core::{
    ChangeSource, SourceError, SourceHandle, SourceSubscription, SubscribeRequest,
};
use feedmux_proto::framing::extract_payload;
use feedmux_proto::{ControlRequest, ControlResponse, RawChange, SubscribeCommand};

use crate::config::SourceConfig;
use crate::control::ControlConnection;
use crate::error::Error;

/// A [`ChangeSource`] backed by an nng change store.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use feedmux_client::{NngSource, SourceConfig};
/// use feedmux_core::FeedRegistry;
/// use feedmux_core::proto::EventKind;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = Arc::new(NngSource::connect(SourceConfig::localhost()).await?);
///     let registry = FeedRegistry::new(source);
///
///     let mut inbox = registry.subscribe("chat", "messages", EventKind::Insert, None);
///     while let Some(event) = inbox.recv().await {
///         println!("change: {:?}", event?);
///     }
///     Ok(())
/// }
/// ```
pub struct NngSource {
    control: Mutex<ControlConnection>,
    config: SourceConfig,
    readers: DashMap<u64, Socket>,
}

impl NngSource {
    /// Connect to a change store and perform the hello exchange.
    pub async fn connect(config: SourceConfig) -> Result<Self, Error> {
        let mut control = ControlConnection::establish(config.clone()).await?;
        control.hello().await?;

        info!(
            control = %config.control_address,
            events = %config.events_address,
            server = %control.server_id(),
            "connected to change store"
        );

        Ok(Self {
            control: Mutex::new(control),
            config,
            readers: DashMap::new(),
        })
    }

    /// Close every event socket and the control connection.
    pub async fn close(&self) {
        let ids: Vec<u64> = self.readers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, socket)) = self.readers.remove(&id) {
                socket.close();
            }
        }
        self.control.lock().await.close();
    }

    /// The store's server identifier from the hello exchange.
    pub async fn server_id(&self) -> String {
        self.control.lock().await.server_id().to_string()
    }

    /// Open a Sub0 socket subscribed to one topic on the event address.
    fn open_event_socket(&self, topic: &str) -> Result<Socket, Error> {
        let socket = Socket::new(Protocol::Sub0)
            .map_err(|e| Error::Connection(format!("failed to create event socket: {}", e)))?;

        socket
            .set_opt::<nng::options::RecvMaxSize>(self.config.max_message_size)
            .map_err(|e| Error::Connection(format!("failed to set max message size: {}", e)))?;

        socket.dial(&self.config.events_address).map_err(|e| {
            Error::Connection(format!(
                "failed to connect to {}: {}",
                self.config.events_address, e
            ))
        })?;

        socket
            .set_opt::<nng::options::protocol::pubsub::Subscribe>(topic.as_bytes().to_vec())
            .map_err(|e| Error::Connection(format!("failed to subscribe to topic: {}", e)))?;

        Ok(socket)
    }
}

#[async_trait]
impl ChangeSource for NngSource {
    async fn open(&self, request: SubscribeRequest) -> Result<SourceSubscription, SourceError> {
        let mut command =
            SubscribeCommand::new(request.channel, request.table).with_kind(request.kind);
        if let Some(filter) = request.filter {
            command = command.with_filter(filter);
        }

        let response = {
            let control = self.control.lock().await;
            control.request(&ControlRequest::Subscribe(command)).await
        }
        .map_err(SourceError::from)?;

        match response {
            ControlResponse::Subscribed {
                subscription_id,
                topic,
            } => {
                let socket = self.open_event_socket(&topic).map_err(SourceError::from)?;
                let (tx, changes) = mpsc::unbounded_channel();
                self.readers.insert(subscription_id, socket.clone());
                spawn_reader(socket, topic, tx);

                debug!(subscription = subscription_id, "remote subscription open");
                Ok(SourceSubscription {
                    handle: SourceHandle::new(subscription_id),
                    changes,
                })
            }
            ControlResponse::Error { message } => Err(SourceError::Rejected(message)),
            other => Err(SourceError::Connection(format!(
                "unexpected subscribe response: {:?}",
                other
            ))),
        }
    }

    async fn close(&self, handle: SourceHandle) -> Result<(), SourceError> {
        if let Some((_, socket)) = self.readers.remove(&handle.id()) {
            socket.close();
        }

        let response = {
            let control = self.control.lock().await;
            control
                .request(&ControlRequest::Unsubscribe {
                    subscription_id: handle.id(),
                })
                .await
        }
        .map_err(SourceError::from)?;

        match response {
            ControlResponse::Unsubscribed => Ok(()),
            // The store no longer knows the subscription; close is
            // idempotent from the multiplexer's point of view.
            ControlResponse::Error { message } => {
                debug!(subscription = handle.id(), %message, "store reported unsubscribe error");
                Ok(())
            }
            other => Err(SourceError::Connection(format!(
                "unexpected unsubscribe response: {:?}",
                other
            ))),
        }
    }
}

impl Drop for NngSource {
    fn drop(&mut self) {
        let ids: Vec<u64> = self.readers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, socket)) = self.readers.remove(&id) {
                socket.close();
            }
        }
    }
}

impl std::fmt::Debug for NngSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NngSource")
            .field("events_address", &self.config.events_address)
            .field("open_subscriptions", &self.readers.len())
            .finish()
    }
}

/// Spawn the blocking reader for one subscription's event socket.
fn spawn_reader(socket: Socket, topic: String, tx: mpsc::UnboundedSender<RawChange>) {
    std::thread::spawn(move || read_loop(&socket, &topic, &tx));
}

/// Drain one event socket until it is closed or the binding goes away.
fn read_loop(socket: &Socket, topic: &str, tx: &mpsc::UnboundedSender<RawChange>) {
    loop {
        let message = match socket.recv() {
            Ok(message) => message,
            Err(nng::Error::Closed) => break,
            Err(nng::Error::TimedOut) => continue,
            Err(error) => {
                warn!(topic, error = %error, "event socket receive failed");
                break;
            }
        };

        // Published frames are the topic bytes followed by a framed payload.
        let data = message.as_slice();
        let frame = match data.strip_prefix(topic.as_bytes()) {
            Some(frame) => frame,
            None => {
                warn!(topic, "event frame with mismatched topic prefix");
                continue;
            }
        };

        let decoded = extract_payload(frame).and_then(|payload| {
            serde_json::from_slice::<RawChange>(payload)
                .map_err(|e| feedmux_proto::Error::Deserialization(e.to_string()))
        });
        let raw = match decoded {
            Ok(raw) => raw,
            Err(error) => {
                warn!(topic, error = %error, "dropping undecodable event frame");
                continue;
            }
        };

        // The binding dropped its receiver; nothing left to feed.
        if tx.send(raw).is_err() {
            break;
        }
    }
}
