//! Feedmux protocol types.
//!
//! This crate defines the value types shared between the multiplexer core and
//! change-source transports: event kinds, interest keys, raw change records,
//! normalized change events, and the control messages a transport exchanges
//! with a remote change store.
//!
//! # Modules
//!
//! - [`event`] - Event kind enums (`ChangeType`, `EventKind`)
//! - [`key`] - Interest key identifying one logical subscription
//! - [`change`] - Raw change records and normalized change events
//! - [`control`] - Subscribe/unsubscribe control messages
//! - [`framing`] - Length-prefix framing for transport payloads
//! - [`error`] - Protocol error types
//!
//! All wire-facing types serialize as JSON via serde; the core never defines
//! a wire format of its own beyond these records.

pub mod change;
pub mod control;
pub mod error;
pub mod event;
pub mod framing;
pub mod key;

pub use error::Error;

// Re-export commonly used types at crate root
pub use change::{ChangeEvent, RawChange, Row};
pub use control::{ControlRequest, ControlResponse, Hello, SubscribeCommand};
pub use event::{ChangeType, EventKind};
pub use key::InterestKey;

/// Protocol version for control-plane compatibility.
///
/// Included in the hello exchange so client and remote store can detect
/// incompatible peers. Incremented on incompatible control message changes.
pub const PROTOCOL_VERSION: u32 = 1;
