//! Protocol error types.

use thiserror::Error;

use crate::event::ChangeType;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A change record carried an event kind the protocol does not know.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// A change record carried the wildcard kind, which is only valid in
    /// subscription requests.
    #[error("change record carries a wildcard event kind")]
    WildcardEvent,

    /// A change record was missing the row state its kind requires.
    #[error("{kind} record missing {field} row state")]
    MissingRowState {
        kind: ChangeType,
        field: &'static str,
    },
}
