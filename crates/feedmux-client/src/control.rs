//! Control connection to the change store.
//!
//! A Req0 socket carrying length-prefix framed JSON control messages. The
//! store answers each request with exactly one response; subscriptions
//! opened here deliver their records on the separate event socket.

use async_nng::AsyncContext;
use nng::options::Options;
use nng::{Message, Protocol, Socket};
use tracing::debug;

use feedmux_proto::control::is_version_compatible;
use feedmux_proto::framing::{encode_frame, extract_payload};
use feedmux_proto::{ControlRequest, ControlResponse, PROTOCOL_VERSION};

use crate::config::SourceConfig;
use crate::error::Error;

/// Control connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket connected, hello not performed.
    Connected,
    /// Hello completed successfully.
    Ready,
    /// Connection closed.
    Closed,
}

/// A control connection to a change store.
pub struct ControlConnection {
    socket: Socket,
    state: ConnectionState,
    config: SourceConfig,
    server_id: String,
}

impl ControlConnection {
    /// Establish a new control connection.
    pub async fn establish(config: SourceConfig) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Req0)
            .map_err(|e| Error::Connection(format!("failed to create socket: {}", e)))?;

        socket
            .set_opt::<nng::options::RecvMaxSize>(config.max_message_size)
            .map_err(|e| Error::Connection(format!("failed to set max message size: {}", e)))?;
        socket
            .set_opt::<nng::options::SendTimeout>(Some(config.timeout))
            .map_err(|e| Error::Connection(format!("failed to set send timeout: {}", e)))?;
        socket
            .set_opt::<nng::options::RecvTimeout>(Some(config.timeout))
            .map_err(|e| Error::Connection(format!("failed to set recv timeout: {}", e)))?;

        socket.dial(&config.control_address).map_err(|e| {
            Error::Connection(format!(
                "failed to connect to {}: {}",
                config.control_address, e
            ))
        })?;

        Ok(Self {
            socket,
            state: ConnectionState::Connected,
            config,
            server_id: String::new(),
        })
    }

    /// Perform the hello exchange with the store.
    pub async fn hello(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connected {
            return Err(Error::Connection(format!(
                "cannot say hello in state {:?}",
                self.state
            )));
        }

        let request = ControlRequest::hello(&self.config.client_id);
        let response = self.exchange(&request).await?;

        match response {
            ControlResponse::Welcome {
                protocol_version,
                server_id,
            } => {
                if !is_version_compatible(PROTOCOL_VERSION, protocol_version) {
                    self.state = ConnectionState::Closed;
                    return Err(Error::Protocol(feedmux_proto::Error::VersionMismatch {
                        expected: PROTOCOL_VERSION,
                        actual: protocol_version,
                    }));
                }
                debug!(server = %server_id, "control connection ready");
                self.server_id = server_id;
                self.state = ConnectionState::Ready;
                Ok(())
            }
            ControlResponse::Error { message } => {
                self.state = ConnectionState::Closed;
                Err(Error::Rejected(message))
            }
            other => Err(Error::Connection(format!(
                "unexpected hello response: {:?}",
                other
            ))),
        }
    }

    /// Send a control request and receive its response.
    pub async fn request(&self, request: &ControlRequest) -> Result<ControlResponse, Error> {
        if self.state != ConnectionState::Ready {
            return Err(Error::Connection(format!(
                "cannot send request in state {:?}",
                self.state
            )));
        }
        self.exchange(request).await
    }

    /// One framed JSON round-trip on the Req0 socket.
    async fn exchange(&self, request: &ControlRequest) -> Result<ControlResponse, Error> {
        let mut ctx = AsyncContext::try_from(&self.socket)
            .map_err(|e| Error::Connection(format!("failed to create async context: {}", e)))?;

        let payload = serde_json::to_vec(request)
            .map_err(|e| Error::Protocol(feedmux_proto::Error::Serialization(e.to_string())))?;
        if payload.len() > self.config.max_message_size {
            return Err(Error::Protocol(feedmux_proto::Error::InvalidMessage(
                format!(
                    "request too large: {} bytes (max: {})",
                    payload.len(),
                    self.config.max_message_size
                ),
            )));
        }
        let framed = encode_frame(&payload)?;

        let message = Message::from(framed.as_slice());
        ctx.send(message, Some(self.config.timeout))
            .await
            .map_err(|(_, e)| match e {
                nng::Error::TimedOut => Error::Timeout,
                _ => Error::Connection(format!("failed to send control request: {}", e)),
            })?;

        let response = ctx
            .receive(Some(self.config.timeout))
            .await
            .map_err(|e| match e {
                nng::Error::TimedOut => Error::Timeout,
                _ => Error::Connection(format!("failed to receive control response: {}", e)),
            })?;

        let payload = extract_payload(response.as_slice())?;
        serde_json::from_slice(payload)
            .map_err(|e| Error::Protocol(feedmux_proto::Error::Deserialization(e.to_string())))
    }

    /// Close the connection.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        // Socket is dropped automatically
    }

    /// Check if the connection is ready for requests.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get the store's server identifier.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }
}

impl std::fmt::Debug for ControlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConnection")
            .field("address", &self.config.control_address)
            .field("state", &self.state)
            .field("client_id", &self.config.client_id)
            .field("server_id", &self.server_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connected, ConnectionState::Ready);
    }

    // Exchange paths are covered by integration tests against a live store.
}
