//! In-memory event bus.
//!
//! Every published message is kept per topic, and the bus tracks one
//! committed offset per topic for its single consumer group. A subscriber
//! starts at the committed offset and receives the rest of the backlog,
//! then live messages.
//!
//! A delivered message is committed only when the subscriber asks for the
//! next one, so whatever a consumer was handed but never finished with is
//! delivered again to the next subscription. [`InMemoryEventBus::close`]
//! ends all streams once they have drained, letting a record keeper run to
//! completion in a test.

use futures::StreamExt;
use parking_sim_core::event_bus::{EventBus, EventBusError, EventStream, Message};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Wakes a subscription.
#[derive(Debug)]
enum Signal {
    Published,
    Failed(EventBusError),
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, Vec<Message>>,
    committed: HashMap<String, usize>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Signal>>>,
    fail_publish: bool,
    closed: bool,
}

impl BusState {
    /// Next undelivered message across `cursors`, in topic order.
    fn next_ready(&self, cursors: &mut [(String, usize)]) -> Option<(String, usize, Message)> {
        cursors.iter_mut().find_map(|(topic, position)| {
            let message = self.topics.get(topic.as_str())?.get(*position)?.clone();
            let offset = *position;
            *position += 1;
            Some((topic.clone(), offset, message))
        })
    }

    fn commit(&mut self, topic: &str, next_offset: usize) {
        let committed = self.committed.entry(topic.to_string()).or_default();
        *committed = (*committed).max(next_offset);
    }
}

/// Event bus backed by in-process channels.
///
/// # Example
///
/// ```
/// use parking_sim_testing::InMemoryEventBus;
/// use parking_sim_core::event_bus::{EventBus, Message};
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish("entries", &Message::new("plate-1", b"{}".to_vec())).await.unwrap();
/// assert_eq!(bus.published("entries").len(), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published to `topic` so far.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.state
            .lock()
            .map(|state| state.topics.get(topic).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Offset the next subscription to `topic` starts from.
    #[must_use]
    pub fn committed(&self, topic: &str) -> usize {
        self.state
            .lock()
            .map(|state| state.committed.get(topic).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make every publish fail (or succeed again).
    pub fn fail_publishes(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_publish = failing;
        }
    }

    /// Deliver a receive error to current subscribers of `topic`.
    pub fn inject_error(&self, topic: &str, error: EventBusError) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(subscribers) = state.subscribers.get_mut(topic) {
                subscribers.retain(|tx| tx.send(Signal::Failed(error.clone())).is_ok());
            }
        }
    }

    /// End every subscription after its pending messages are delivered.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            state.subscribers.clear();
        }
    }

    fn publish_now(&self, topic: &str, message: &Message) -> Result<(), EventBusError> {
        let mut state = self.state.lock().map_err(|_| EventBusError::PublishFailed {
            topic: topic.to_string(),
            reason: "Mutex lock failed".to_string(),
        })?;

        if topic.is_empty() {
            return Err(EventBusError::InvalidTopic(topic.to_string()));
        }
        if state.fail_publish || state.closed {
            return Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: if state.closed { "bus closed" } else { "injected failure" }.to_string(),
            });
        }

        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());
        if let Some(subscribers) = state.subscribers.get_mut(topic) {
            subscribers.retain(|tx| tx.send(Signal::Published).is_ok());
        }
        Ok(())
    }

    fn subscribe_now(&self, topics: &[&str]) -> Result<EventStream, EventBusError> {
        let mut state = self.state.lock().map_err(|_| EventBusError::SubscriptionFailed {
            topics: topics.iter().map(ToString::to_string).collect(),
            reason: "Mutex lock failed".to_string(),
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cursors = Vec::with_capacity(topics.len());
        for topic in topics {
            let start = state.committed.get(*topic).copied().unwrap_or_default();
            cursors.push(((*topic).to_string(), start));
            if !state.closed {
                state
                    .subscribers
                    .entry((*topic).to_string())
                    .or_default()
                    .push(tx.clone());
            }
        }
        drop(tx);
        drop(state);

        let shared = Arc::clone(&self.state);
        let stream = async_stream::stream! {
            let mut pending: Option<(String, usize)> = None;
            loop {
                let next = match shared.lock() {
                    Ok(mut state) => {
                        // asking for the next message acknowledges the last one
                        if let Some((topic, offset)) = pending.take() {
                            state.commit(&topic, offset + 1);
                        }
                        Some(state.next_ready(&mut cursors))
                    }
                    Err(_) => None,
                };
                let Some(next) = next else {
                    yield Err(EventBusError::TransportError("Mutex lock failed".to_string()));
                    break;
                };

                if let Some((topic, offset, message)) = next {
                    pending = Some((topic, offset));
                    yield Ok(message);
                    continue;
                }

                match rx.recv().await {
                    Some(Signal::Published) => {}
                    Some(Signal::Failed(error)) => yield Err(error),
                    None => break,
                }
            }
        };
        Ok(stream.boxed())
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        message: &Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let result = self.publish_now(topic, message);
        Box::pin(async move { result })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let result = self.subscribe_now(topics);
        Box::pin(async move { result })
    }
}
