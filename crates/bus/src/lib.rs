//! Message bus abstraction.
//!
//! Publishing is keyed: messages sharing a key land on the same partition and
//! are delivered in publish order. Consumption is at-least-once; offsets are
//! committed explicitly after a message has been handled.

pub mod error;
pub mod kafka;
pub mod memory;
pub mod message;

use async_trait::async_trait;

pub use error::{BusError, Result};
pub use kafka::{KafkaEventBus, KafkaEventBusBuilder};
pub use memory::InMemoryEventBus;
pub use message::{BusMessage, PublishedMessage};

/// A keyed publish/subscribe transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a payload and waits for the broker to acknowledge it.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;

    /// Joins a consumer group on the given topics.
    async fn subscribe(&self, topics: &[&str], group: &str) -> Result<Box<dyn Subscription>>;
}

/// An open subscription within a consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next message. Returns None once the subscription is closed.
    async fn next_message(&mut self) -> Option<Result<BusMessage>>;

    /// Commits the message's offset so the group does not receive it again.
    async fn commit(&mut self, message: &BusMessage) -> Result<()>;
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for std::sync::Arc<T> {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        (**self).publish(topic, key, payload).await
    }

    async fn subscribe(&self, topics: &[&str], group: &str) -> Result<Box<dyn Subscription>> {
        (**self).subscribe(topics, group).await
    }
}
