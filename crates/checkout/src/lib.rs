//! Checkout orchestration.
//!
//! A checkout follows these steps:
//! 1. Validate the items
//! 2. Reject a reused idempotency token
//! 3. Check every product against the catalog, when one is configured
//! 4. Commit the order, its detail, the token and an outbox row together
//! 5. Publish the `OrderCreated` event and mark the outbox row sent
//!
//! Rows whose publish failed are retried by the [`OutboxDispatcher`].

pub mod catalog;
pub mod error;
pub mod history;
pub mod outbox;
pub mod publisher;
pub mod service;

pub use catalog::{
    CatalogError, HttpProductCatalog, InMemoryProductCatalog, ProductCatalog, ProductInfo,
};
pub use error::{CheckoutError, Result};
pub use history::OrderHistoryService;
pub use outbox::{DispatcherConfig, MIN_POLL_INTERVAL, OutboxDispatcher};
pub use publisher::{EventPublisher, PublishError};
pub use service::CheckoutService;
