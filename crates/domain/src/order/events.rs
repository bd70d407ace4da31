//! Integration events exchanged with other services over the bus.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

use super::{CheckoutItem, ProductItem};

/// Topic receiving [`OrderCreatedEvent`].
pub const ORDER_CREATED_TOPIC: &str = "order.created";

/// Topic receiving [`ProductStockUpdatedEvent`].
pub const STOCK_UPDATED_TOPIC: &str = "stock.updated";

/// Topic the payment service publishes [`PaymentSettledEvent`] to.
pub const PAYMENT_SUCCESS_TOPIC: &str = "payment.success";

/// Topic receiving payment messages that could not be processed.
pub const PAYMENT_DEAD_LETTER_TOPIC: &str = "payment.success.dlq";

/// Published once an order and its detail have been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: f64,
    pub payment_method: String,
    pub shipping_address: String,
}

impl DomainEvent for OrderCreatedEvent {
    const TOPIC: &'static str = ORDER_CREATED_TOPIC;

    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Published after a settled payment completed the order, listing the stock
/// that left the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockUpdatedEvent {
    pub order_id: OrderId,
    pub products: Vec<ProductItem>,
    pub event_time: DateTime<Utc>,
}

impl ProductStockUpdatedEvent {
    /// Builds the event from the line items frozen at checkout.
    pub fn from_items(order_id: OrderId, items: &[CheckoutItem], event_time: DateTime<Utc>) -> Self {
        Self {
            order_id,
            products: items.iter().map(CheckoutItem::to_product_item).collect(),
            event_time,
        }
    }
}

impl DomainEvent for ProductStockUpdatedEvent {
    const TOPIC: &'static str = STOCK_UPDATED_TOPIC;

    fn event_type(&self) -> &'static str {
        "ProductStockUpdated"
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Inbound notification from the payment service.
///
/// Unknown fields are ignored so the payment service can extend its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSettledEvent {
    pub order_id: OrderId,
}
