//! Domain layer for the order checkout service.
//!
//! This crate holds the rules that do not depend on storage or transport:
//! - [`OrderStatus`] state machine with its persisted codes and labels
//! - [`CheckoutRequest`] validation and [`CheckoutSummary`] totals
//! - [`OrderSnapshot`] encoding of line items and status history
//! - Integration events published to and consumed from the bus

pub mod event;
pub mod order;

pub use event::DomainEvent;
pub use order::{
    CheckoutItem, CheckoutRequest, CheckoutSummary, MAX_PAYMENT_METHOD_LEN, MAX_QUANTITY, MIN_QUANTITY,
    ORDER_CREATED_TOPIC, OrderCreatedEvent, OrderError, OrderSnapshot, OrderStatus,
    PAYMENT_DEAD_LETTER_TOPIC, PAYMENT_SUCCESS_TOPIC, PaymentSettledEvent, ProductItem,
    ProductStockUpdatedEvent, SNAPSHOT_SCHEMA_VERSION, STOCK_UPDATED_TOPIC, SnapshotError,
    StatusHistoryEntry, UnknownStatus, append_history, decode_history, decode_products,
    validate_items,
};
