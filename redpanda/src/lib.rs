//! Redpanda transport for the parking simulator.
//!
//! [`RedpandaEventBus`] implements the [`EventBus`] trait from
//! `parking-sim-core` on top of rdkafka, so any Kafka-compatible broker
//! (Redpanda, Apache Kafka, MSK) can carry the entry and exit topics.
//!
//! # Messages
//!
//! - **Key**: the vehicle plate, so events for one vehicle land on one
//!   partition and keep their order.
//! - **Payload**: the event JSON, passed through untouched. Decoding is the
//!   consumer's job; a malformed or empty payload is delivered as-is and
//!   fails there.
//! - **Header**: `content-type: application/json`.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - The subscription stream reads straight from the consumer, one message
//!   at a time, with nothing buffered ahead of the subscriber
//! - A message's offset is committed when the subscriber polls for the next
//!   one, i.e. after it has finished processing the message
//! - The message in flight at shutdown or crash is never committed and will
//!   be redelivered, so duplicate exits produce duplicate summaries
//!   downstream
//!
//! # Example
//!
//! ```no_run
//! use parking_sim_redpanda::RedpandaEventBus;
//! use parking_sim_core::event_bus::{EventBus, Message};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("parking-record-keeper")
//!     .auto_offset_reset("earliest")
//!     .build()?;
//!
//! let payload = br#"{"id":"1","vehicle_plate":"plate-1","entry_date_time":"2024-09-11T10:00:00Z"}"#;
//! event_bus
//!     .publish("entry_events_queue", &Message::new("plate-1", payload.to_vec()))
//!     .await?;
//!
//! let mut stream = event_bus.subscribe(&["entry_events_queue"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => println!("{} -> {} bytes", message.key, message.payload.len()),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use parking_sim_core::event_bus::{EventBus, EventBusError, EventStream, Message};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Message as _, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Content type attached to every published message.
pub const CONTENT_TYPE: &str = "application/json";

/// Redpanda event bus implementation.
///
/// # Example
///
/// ```no_run
/// use parking_sim_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Basic configuration
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// // Custom configuration
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing messages
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group prefix (if explicitly set)
    consumer_group: Option<String>,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created from the broker list.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Check that a broker answers a metadata request.
    ///
    /// Producer creation does not contact the cluster, so this is what
    /// connection bootstrap retries on.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no broker responds
    /// within the producer timeout.
    pub async fn ping(&self) -> Result<(), EventBusError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;

        let brokers = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata task failed: {e}")))?
        .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata request failed: {e}")))?;

        tracing::debug!(brokers, "Broker metadata received");
        Ok(())
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group prefix for subscriptions.
    ///
    /// Each subscription joins `<prefix>.<topics>`, so the entry and exit
    /// loops of one record keeper rebalance independently while several
    /// record keeper instances still share each topic.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set where new consumer groups start reading: `"earliest"`,
    /// `"latest"` or `"error"`.
    ///
    /// Default: `"latest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.filter(|b| !b.trim().is_empty()).ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            acks,
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "latest".to_string()),
        })
    }
}

/// Consumer group id for a subscription to `topics`.
fn group_id(prefix: Option<&str>, topics: &[String]) -> String {
    let mut sorted = topics.to_vec();
    sorted.sort();
    format!("{}.{}", prefix.unwrap_or("parking-sim"), sorted.join("-"))
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        message: &Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let message = message.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            if topic.is_empty() {
                return Err(EventBusError::InvalidTopic(topic));
            }

            let headers = OwnedHeaders::new().insert(Header {
                key: "content-type",
                value: Some(CONTENT_TYPE),
            });
            let record = FutureRecord::to(&topic)
                .payload(&message.payload)
                .key(&message.key)
                .headers(headers);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        key = %message.key,
                        "Message published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group_id = group_id(self.consumer_group.as_deref(), &topics);
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            if topics.is_empty() || topics.iter().any(String::is_empty) {
                return Err(EventBusError::InvalidTopic(format!("{topics:?}")));
            }

            // Manual commit for at-least-once
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let stream = async_stream::stream! {
                // Offset of the message most recently handed to the subscriber
                let mut delivered: Option<Delivered> = None;

                loop {
                    // Polling for the next message acknowledges the previous one
                    if let Some(done) = delivered.take() {
                        done.commit(&consumer);
                    }

                    let item = match consumer.recv().await {
                        Ok(borrowed) => {
                            let message = Message {
                                key: borrowed
                                    .key()
                                    .map(|k| String::from_utf8_lossy(k).into_owned())
                                    .unwrap_or_default(),
                                payload: borrowed.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                            };
                            tracing::trace!(
                                topic = borrowed.topic(),
                                partition = borrowed.partition(),
                                offset = borrowed.offset(),
                                key = %message.key,
                                "Received message"
                            );
                            delivered = Some(Delivered {
                                topic: borrowed.topic().to_string(),
                                partition: borrowed.partition(),
                                offset: borrowed.offset(),
                            });
                            Ok(message)
                        }
                        Err(e) => Err(EventBusError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };
                    yield item;
                }
                // Unreachable; pins the generator body type to `()` (edition 2024 never-type fallback)
                #[allow(unreachable_code)]
                ()
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// Position of a message handed out but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivered {
    topic: String,
    partition: i32,
    offset: i64,
}

impl Delivered {
    /// Offsets to commit so the group resumes after this message.
    fn to_commit(&self) -> Result<TopicPartitionList, KafkaError> {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))?;
        Ok(list)
    }

    fn commit(&self, consumer: &StreamConsumer) {
        let result = self
            .to_commit()
            .and_then(|list| consumer.commit(&list, CommitMode::Async));
        if let Err(e) = result {
            tracing::warn!(
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                error = %e,
                "Failed to commit offset (message may be redelivered)"
            );
        }
    }
}
