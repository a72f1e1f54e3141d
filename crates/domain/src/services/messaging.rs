//! Event publisher trait and implementations.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// A broker failure. Publishing is fire-and-forget, so callers only log it.
#[derive(Debug, Error)]
#[error("Publish error: {0}")]
pub struct PublishError(pub String);

/// Trait for publishing serialized events to a topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// A message captured by [`InMemoryPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decodes the payload as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    messages: Vec<PublishedMessage>,
    fail_on_publish: bool,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject every message.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_publish = fail;
    }

    /// Returns every accepted message in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .clone()
    }

    /// Returns the topics of accepted messages in publish order.
    pub fn topics(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.topic).collect()
    }

    pub fn count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_publish {
            return Err(PublishError("broker unavailable".to_string()));
        }

        state.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Publisher that writes each message to the log instead of a broker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        tracing::info!(
            topic,
            payload = %String::from_utf8_lossy(&payload),
            "event published"
        );
        Ok(())
    }
}
