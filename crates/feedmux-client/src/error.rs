//! Client error types.

use thiserror::Error;

use feedmux_core::SourceError;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] feedmux_proto::Error),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The store rejected a request.
    #[error("rejected by store: {0}")]
    Rejected(String),
}

impl From<Error> for SourceError {
    fn from(error: Error) -> Self {
        match error {
            Error::Connection(message) => SourceError::Connection(message),
            Error::Protocol(inner) => SourceError::Connection(inner.to_string()),
            Error::Timeout => SourceError::Timeout,
            Error::Rejected(message) => SourceError::Rejected(message),
        }
    }
}
