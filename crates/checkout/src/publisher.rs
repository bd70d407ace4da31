//! Serializes domain events and publishes them keyed by order.

use std::sync::Arc;

use bus::{BusError, EventBus};
use domain::DomainEvent;
use order_store::OutboxMessage;
use thiserror::Error;

/// Errors raised while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be encoded.
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus did not accept the event.
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),
}

/// Publishes domain events to the bus. No retries are made here.
pub struct EventPublisher<B: EventBus> {
    bus: Arc<B>,
}

impl<B: EventBus> Clone for EventPublisher<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<B: EventBus> EventPublisher<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Publishes a JSON payload to an explicit topic and key.
    pub async fn publish_raw(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        match self.bus.publish(topic, partition_key, payload).await {
            Ok(()) => {
                metrics::counter!("events_published_total", "topic" => topic.to_string())
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("event_publish_failures_total", "topic" => topic.to_string())
                    .increment(1);
                Err(e.into())
            }
        }
    }

    /// Publishes an event to its topic, keyed by its order.
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type(), order_id = %event.order_id()))]
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.publish_raw(E::TOPIC, &event.partition_key(), &payload)
            .await
    }

    /// Publishes a message staged in the outbox under its stored topic and key.
    #[tracing::instrument(skip(self, message), fields(outbox_id = message.id, topic = %message.topic))]
    pub async fn publish_outbox(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        let payload = message.payload_bytes()?;
        self.publish_raw(&message.topic, &message.partition_key, &payload)
            .await
    }
}
