//! Core error types.

use std::sync::Arc;

use thiserror::Error;

use crate::source::SourceError;

/// Terminal errors delivered on a consumer's feed stream.
///
/// Cloneable because one failure fans out to every consumer attached to the
/// failed key; the underlying source error is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// The remote handshake for the key's upstream binding failed. The
    /// registry entry is removed, so a later subscribe with the same key
    /// retries from scratch.
    #[error("subscription open failed: {0}")]
    OpenFailed(Arc<SourceError>),

    /// The upstream ended an open subscription without being asked to.
    #[error("upstream subscription terminated: {0}")]
    Disconnected(Arc<SourceError>),
}

impl FeedError {
    /// Wrap a source error from a failed open.
    pub fn open_failed(error: SourceError) -> Self {
        FeedError::OpenFailed(Arc::new(error))
    }

    /// Wrap a source error from a terminated subscription.
    pub fn disconnected(error: SourceError) -> Self {
        FeedError::Disconnected(Arc::new(error))
    }
}
