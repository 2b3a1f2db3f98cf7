//! The pub/sub seam the sync protocol rides on.
//!
//! A transport offers named topics; each topic carries named events with
//! JSON payloads. Delivery is at-least-once with no ordering across event
//! names, and a publisher may receive its own messages.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One delivered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    pub payload: Value,
}

/// Stream of frames for one (topic, event) subscription. Ends when the
/// subscription is cancelled or the transport closes.
pub type Subscription = BoxStream<'static, ChannelFrame>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is not connected.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// The transport refused the publish.
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Subscribing was refused.
    #[error("subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn subscribe(&self, topic: &str, event: &str) -> Result<Subscription, TransportError>;

    async fn publish(&self, topic: &str, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Ends the matching subscription stream.
    async fn unsubscribe(&self, topic: &str, event: &str) -> Result<(), TransportError>;
}
