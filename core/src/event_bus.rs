//! Event transport abstraction.
//!
//! The generator publishes entry and exit events to two named topics; the
//! record keeper subscribes to each of them. Payloads are opaque bytes at
//! this layer so that a malformed message still reaches the consumer and
//! fails at decode time rather than inside the transport.
//!
//! # Delivery
//!
//! - **At-least-once**: a message may be delivered more than once.
//! - **Ordered per key**: messages are keyed by vehicle plate, so events
//!   about one vehicle stay in publish order within a topic.
//! - **No ordering across topics**: an exit may be observed before the
//!   matching entry.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `parking-sim-testing`
//! - `RedpandaEventBus` in `parking-sim-redpanda` (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use parking_sim_core::event_bus::{EventBus, Message};
//!
//! async fn example(bus: impl EventBus) -> Result<(), Box<dyn std::error::Error>> {
//!     bus.publish("entry_events_queue", &Message::json("plate-1", &event)?).await?;
//!
//!     let mut stream = bus.subscribe(&["entry_events_queue"]).await?;
//!     while let Some(message) = stream.next().await {
//!         println!("{} bytes for {}", message?.payload.len(), "plate-1");
//!     }
//!     Ok(())
//! }
//! ```

use futures::Stream;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Topic name empty or otherwise unusable
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Network or transport error while consuming
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A single message on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Partitioning key (the vehicle plate for parking events).
    pub key: String,
    /// Raw payload, JSON for parking events.
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message from raw parts.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// Build a message with a JSON-encoded payload.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(key, serde_json::to_vec(value)?))
    }
}

/// Stream of messages from a subscription.
///
/// Items are `Err` when the transport fails to receive; such errors are
/// per-item and the stream keeps going. The stream ends when the
/// subscription is torn down.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Message, EventBusError>> + Send>>;

/// Publish/subscribe transport.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the bus can be shared as
/// `Arc<dyn EventBus>` between the generator and its tests.
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic.
    ///
    /// Resolves once the broker has acknowledged the message.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects the
    /// message or the send times out.
    fn publish(
        &self,
        topic: &str,
        message: &Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the consumer cannot
    /// be created or the topics cannot be joined.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
