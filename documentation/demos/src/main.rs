//! Live change-feed demo.
//!
//! Wires a [`FeedRegistry`] over an in-process [`MemorySource`] and shows
//! the multiplexer's behavior end to end: two UI views sharing one upstream
//! subscription, a second interest key with its own feed, a malformed
//! record being dropped, and group-wide teardown.
//!
//! Run with: cargo run
//! Set RUST_LOG=feedmux_core=debug to watch the lifecycle logging.

use std::sync::Arc;

use feedmux_core::proto::{EventKind, RawChange, Row};
use feedmux_core::{FeedRegistry, MemorySource};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let source = Arc::new(MemorySource::new());
    let registry = FeedRegistry::new(source.clone());

    // Two views watch chat inserts: they share one upstream subscription.
    let mut inbox = registry.subscribe("chat", "messages", EventKind::Insert, None);
    let mut badge = registry.subscribe("chat", "messages", EventKind::Insert, None);
    // A moderation panel watches every kind of change.
    let mut audit = registry.subscribe("audit", "messages", EventKind::Any, None);

    source.wait_for_subscriptions(2).await;
    info!(
        upstream_subscriptions = source.open_count(),
        active_feeds = registry.active_feeds(),
        "three consumers, two upstream subscriptions"
    );

    source.publish(RawChange::insert(
        "messages",
        row(&[("id", 1.into()), ("body", "hello".into())]),
    ));
    source.publish(RawChange::update(
        "messages",
        Some(row(&[("id", 1.into()), ("body", "hello".into())])),
        row(&[("id", 1.into()), ("body", "hello, world".into())]),
    ));
    // A broken record: dropped by normalization, the feed keeps going.
    source.publish(RawChange {
        event: "REINDEX".into(),
        table: "messages".into(),
        before: None,
        after: None,
    });
    source.publish(RawChange::insert(
        "messages",
        row(&[("id", 2.into()), ("body", "second message".into())]),
    ));

    // Both insert views receive both inserts, in order.
    for view in ["inbox", "badge"] {
        let stream = if view == "inbox" { &mut inbox } else { &mut badge };
        for _ in 0..2 {
            let event = stream.recv().await.unwrap().unwrap();
            info!(
                view,
                kind = %event.change_type,
                body = %event.after.as_ref().unwrap()["body"],
                "delivered"
            );
        }
    }

    // The audit view saw the update as well.
    for _ in 0..3 {
        let event = audit.recv().await.unwrap().unwrap();
        info!(view = "audit", kind = %event.change_type, "delivered");
    }

    // Tearing down the chat group completes both of its consumers; the
    // audit group is untouched.
    registry.unsubscribe("chat");
    assert!(inbox.recv().await.is_none());
    assert!(badge.recv().await.is_none());
    info!(active_feeds = registry.active_feeds(), "chat group torn down");

    registry.unsubscribe_all();
    assert!(audit.recv().await.is_none());

    let stats = registry.stats().snapshot();
    info!(
        bindings_opened = stats.bindings_opened,
        events_forwarded = stats.events_forwarded,
        malformed_dropped = stats.malformed_dropped,
        "done"
    );
}
