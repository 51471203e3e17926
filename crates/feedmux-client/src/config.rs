//! Source configuration.

use std::time::Duration;

/// Default TCP address for the control socket.
pub const DEFAULT_CONTROL_ADDRESS: &str = "tcp://127.0.0.1:9710";

/// Default TCP address for the event publish socket.
pub const DEFAULT_EVENTS_ADDRESS: &str = "tcp://127.0.0.1:9711";

/// Default control request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum message size (4 MB), matching the framing limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Configuration for an [`NngSource`](crate::NngSource).
///
/// The change store exposes two sockets: a request/reply control socket for
/// opening and closing subscriptions, and a publish socket that pushes
/// change records by topic.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Control socket address (e.g. "tcp://127.0.0.1:9710").
    pub control_address: String,

    /// Event publish socket address.
    pub events_address: String,

    /// Control request timeout.
    pub timeout: Duration,

    /// Maximum message size in bytes.
    pub max_message_size: usize,

    /// Client identifier for store-side tracking.
    pub client_id: String,
}

impl SourceConfig {
    /// Create a configuration with the given socket addresses.
    pub fn new(control_address: impl Into<String>, events_address: impl Into<String>) -> Self {
        Self {
            control_address: control_address.into(),
            events_address: events_address.into(),
            timeout: DEFAULT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            client_id: generate_client_id(),
        }
    }

    /// Create a configuration for a store on localhost default ports.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_CONTROL_ADDRESS, DEFAULT_EVENTS_ADDRESS)
    }

    /// Set the control request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the client identifier.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::localhost()
    }
}

/// Generate a unique client identifier.
fn generate_client_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("feedmux-{:x}", timestamp)
}
