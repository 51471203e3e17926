//! Feedmux core - change-feed subscription multiplexer.
//!
//! This crate turns one upstream row-level change stream into many
//! independently-consumable, de-duplicated event streams:
//!
//! - [`FeedRegistry`] coordinates subscriptions: one upstream binding per
//!   distinct interest key, however many consumers subscribe.
//! - [`Binding`](binding::Binding) owns the single remote subscription for a
//!   key and forwards normalized events.
//! - [`Broadcaster`] fans one binding's events out to any number of
//!   attached [`FeedStream`] consumers, replay-free.
//! - [`ChangeSource`] is the transport seam; [`MemorySource`] is the
//!   in-process implementation, and `feedmux-client` provides an nng-backed
//!   one.
//!
//! The multiplexer provides no durability or replay and no ordering beyond
//! what the upstream transport delivers; failures are isolated per interest
//! key and surface as a terminal error on the affected streams only.

pub mod binding;
pub mod broadcast;
pub mod error;
pub mod memory;
pub mod registry;
pub mod source;
pub mod stats;

pub use binding::{Binding, BindingState};
pub use broadcast::{Broadcaster, FeedStream};
pub use error::FeedError;
pub use memory::MemorySource;
pub use registry::FeedRegistry;
pub use source::{ChangeSource, SourceError, SourceHandle, SourceSubscription, SubscribeRequest};
pub use stats::{FeedStats, StatsSnapshot};

/// Re-export protocol types.
pub use feedmux_proto as proto;
