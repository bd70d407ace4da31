//! Transactional persistence for orders, their details, idempotency tokens
//! and the event outbox.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use outbox::{NewOutboxMessage, OutboxFactory, OutboxMessage, StatusOutboxFactory};
pub use postgres::PostgresOrderStore;
pub use query::HistoryQuery;
pub use record::{
    CheckoutWrite, NewOrder, NewOrderDetail, OrderDetailRecord, OrderHistoryRecord, OrderRecord,
    SavedCheckout, StatusChange,
};
pub use store::{CheckoutStore, IdempotencyGuard, OrderStore, OrderStoreExt, OutboxStore};
