//! # In-Memory Transport
//!
//! A process-local [`ChannelTransport`] for tests, benches and the
//! simulator. Every client gets its own [`MemoryTransport`] handle on a
//! shared [`MemoryHub`]. The hub reproduces the delivery quirks the protocol
//! must survive: publishers hear their own messages, and duplicate delivery
//! can be switched on. It can also be taken offline to exercise publish
//! failures.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{trace, warn};

use crate::config::MEMORY_TOPIC_CAPACITY;

use super::transport::{ChannelFrame, ChannelTransport, Subscription, TransportError};

type Key = (String, String);

/// Shared routing table of the in-memory transport.
pub struct MemoryHub {
    routes: DashMap<Key, broadcast::Sender<ChannelFrame>>,
    duplicate_delivery: AtomicBool,
    offline: AtomicBool,
    published: AtomicU64,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: DashMap::new(),
            duplicate_delivery: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            published: AtomicU64::new(0),
        })
    }

    /// A new client handle on this hub.
    pub fn transport(self: &Arc<Self>) -> MemoryTransport {
        MemoryTransport {
            hub: Arc::clone(self),
            cancels: DashMap::new(),
        }
    }

    /// Deliver every publish twice.
    pub fn set_duplicate_delivery(&self, on: bool) {
        self.duplicate_delivery.store(on, Ordering::Relaxed);
    }

    /// Make every publish fail with [`TransportError::NotConnected`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of accepted publishes.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn route(&self, topic: &str, event: &str) -> broadcast::Sender<ChannelFrame> {
        self.routes
            .entry((topic.to_string(), event.to_string()))
            .or_insert_with(|| broadcast::channel(MEMORY_TOPIC_CAPACITY).0)
            .clone()
    }
}

/// One client's connection to a [`MemoryHub`].
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    cancels: DashMap<Key, watch::Sender<bool>>,
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn subscribe(&self, topic: &str, event: &str) -> Result<Subscription, TransportError> {
        let rx = self.hub.route(topic, event).subscribe();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        if let Some(previous) = self
            .cancels
            .insert((topic.to_string(), event.to_string()), cancel_tx)
        {
            let _ = previous.send(true);
        }

        let stream = futures::stream::unfold((rx, cancel_rx), |(mut rx, mut cancel)| async move {
            loop {
                tokio::select! {
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            return None;
                        }
                    }
                    received = rx.recv() => match received {
                        Ok(frame) => return Some((frame, (rx, cancel))),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "memory subscription lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn publish(&self, topic: &str, event: &str, payload: Value) -> Result<(), TransportError> {
        if self.hub.offline.load(Ordering::Relaxed) {
            return Err(TransportError::NotConnected("memory hub is offline".into()));
        }
        let frame = ChannelFrame {
            event: event.to_string(),
            payload,
        };
        let route = self.hub.route(topic, event);
        let copies = if self.hub.duplicate_delivery.load(Ordering::Relaxed) {
            2
        } else {
            1
        };
        for _ in 0..copies {
            // No subscribers is not an error for pub/sub.
            let receivers = route.send(frame.clone()).unwrap_or(0);
            trace!(topic, event, receivers, "memory publish");
        }
        self.hub.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str, event: &str) -> Result<(), TransportError> {
        if let Some((_, cancel)) = self.cancels.remove(&(topic.to_string(), event.to_string())) {
            let _ = cancel.send(true);
        }
        Ok(())
    }
}
