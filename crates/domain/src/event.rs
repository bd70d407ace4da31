//! Common behaviour of events published to the bus.

use common::OrderId;
use serde::Serialize;

/// An event about one order, published to a fixed topic.
///
/// Every event is keyed by its order so that the bus keeps events of the
/// same order in publish order.
pub trait DomainEvent: Serialize + Send + Sync {
    /// Topic the event is published to.
    const TOPIC: &'static str;

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the order this event is about.
    fn order_id(&self) -> OrderId;

    /// Returns the bus partition key, `order-<id>`.
    fn partition_key(&self) -> String {
        self.order_id().partition_key()
    }
}
