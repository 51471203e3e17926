//! Feedmux client - nng-backed change source.
//!
//! This crate connects the feedmux multiplexer to a remote change store
//! over nng: a Req0 control socket negotiates subscriptions, and each open
//! subscription receives pushed change records on its own Sub0 socket.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use feedmux_client::{NngSource, SourceConfig};
//! use feedmux_core::FeedRegistry;
//! use feedmux_core::proto::EventKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to the store
//!     let source = Arc::new(NngSource::connect(SourceConfig::localhost()).await?);
//!
//!     // Multiplex subscriptions over the one connection
//!     let registry = FeedRegistry::new(source);
//!     let mut inbox = registry.subscribe("chat", "messages", EventKind::Insert, None);
//!
//!     while let Some(event) = inbox.recv().await {
//!         println!("change: {:?}", event?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod source;

pub use config::SourceConfig;
pub use control::{ControlConnection, ConnectionState};
pub use error::Error;
pub use source::NngSource;

/// Re-export protocol types.
pub use feedmux_proto as proto;
