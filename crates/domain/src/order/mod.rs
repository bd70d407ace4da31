//! Order status, checkout items and related types.

mod checkout;
mod events;
mod snapshot;
mod state;
mod value_objects;

pub use checkout::{CheckoutRequest, CheckoutSummary, MAX_PAYMENT_METHOD_LEN, validate_items};
pub use events::{
    ORDER_CREATED_TOPIC, OrderCreatedEvent, PAYMENT_DEAD_LETTER_TOPIC, PAYMENT_SUCCESS_TOPIC,
    PaymentSettledEvent, ProductStockUpdatedEvent, STOCK_UPDATED_TOPIC,
};
pub use snapshot::{
    OrderSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotError, StatusHistoryEntry, append_history,
    decode_history, decode_products,
};
pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::{CheckoutItem, MAX_QUANTITY, MIN_QUANTITY, ProductItem};

use common::ProductId;
use thiserror::Error;

/// Errors raised by order rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The checkout carried no items.
    #[error("items are required")]
    NoItems,

    /// The same product appears twice in one checkout.
    #[error("duplicate product id: {product_id}")]
    DuplicateProduct { product_id: ProductId },

    /// Quantity outside the accepted range.
    #[error("invalid quantity {quantity} for product {product_id}: must be between 1 and 1000")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// Price not strictly positive.
    #[error("invalid price {price} for product {product_id}: must be greater than 0")]
    InvalidPrice { product_id: ProductId, price: f64 },

    /// Payment method longer than the order header column allows.
    #[error("payment method is {length} characters: at most 50 allowed")]
    PaymentMethodTooLong { length: usize },

    /// Status change not allowed by the state machine.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
