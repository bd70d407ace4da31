//! Events staged for publication in the same transaction as the order.

use chrono::{DateTime, Utc};
use domain::{CheckoutItem, DomainEvent};
use serde_json::Value;
use uuid::Uuid;

use common::OrderId;

/// Builds the outbox message for an order once its id has been assigned.
pub type OutboxFactory =
    Box<dyn FnOnce(OrderId) -> std::result::Result<NewOutboxMessage, serde_json::Error> + Send>;

/// Builds the outbox message staged with a status change, from the order's
/// line items as stored at checkout.
pub type StatusOutboxFactory = Box<
    dyn FnOnce(OrderId, Vec<CheckoutItem>) -> std::result::Result<NewOutboxMessage, serde_json::Error>
        + Send,
>;

/// An event to be written to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxMessage {
    pub event_id: Uuid,
    pub topic: String,
    pub partition_key: String,
    pub payload: Value,
}

impl NewOutboxMessage {
    /// Encodes a domain event under its own topic and partition key.
    pub fn for_event<E: DomainEvent>(event: &E) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            topic: E::TOPIC.to_string(),
            partition_key: event.partition_key(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// A stored outbox message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: i64,
    pub event_id: Uuid,
    pub topic: String,
    pub partition_key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

impl OutboxMessage {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Returns the payload as it goes on the wire.
    pub fn payload_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::OrderCreatedEvent;

    #[test]
    fn message_carries_topic_and_key_of_event() {
        let event = OrderCreatedEvent {
            order_id: OrderId::new(4),
            user_id: UserId::new(1),
            total_amount: 12.5,
            payment_method: "card".to_string(),
            shipping_address: "X".to_string(),
        };
        let message = NewOutboxMessage::for_event(&event).unwrap();

        assert_eq!(message.topic, "order.created");
        assert_eq!(message.partition_key, "order-4");
        assert_eq!(message.payload["total_amount"], 12.5);
    }
}
