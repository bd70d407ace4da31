use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DetailId, OrderId};
use domain::OrderStatus;

use crate::{
    CheckoutWrite, HistoryQuery, NewOrder, NewOrderDetail, OrderDetailRecord, OrderHistoryRecord,
    OrderRecord, OutboxMessage, Result, SavedCheckout, StatusChange, StatusOutboxFactory,
};

/// Records which checkout requests have already been processed.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Returns true if the token has been recorded.
    async fn check_token(&self, token: &str) -> Result<bool>;

    /// Records a token on its own.
    ///
    /// Fails with `DuplicateToken` if it was recorded before. Checkout records
    /// its token through [`OrderStore::save_checkout`] instead.
    async fn record_token(&self, token: &str) -> Result<()>;
}

/// Persistence of order headers and their details.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the detail, the order referencing it, the idempotency token and
    /// the outbox message atomically. Either everything is visible afterwards
    /// or nothing is.
    async fn save_checkout(&self, write: CheckoutWrite) -> Result<SavedCheckout>;

    /// Inserts a detail and its order atomically.
    async fn save_order_and_detail(
        &self,
        order: NewOrder,
        detail: NewOrderDetail,
    ) -> Result<OrderId> {
        let saved = self.save_checkout(CheckoutWrite::new(order, detail)).await?;
        Ok(saved.order_id)
    }

    /// Moves an order to a new status, appends the change to its history and,
    /// when `outbox` is given, stages the message it builds from the order's
    /// line items. All of it commits together or not at all.
    ///
    /// The order row is locked for the duration, so concurrent updates of one
    /// order are serialized. Undecodable line items fail with `CorruptData`
    /// and leave the status unchanged.
    async fn change_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        outbox: Option<StatusOutboxFactory>,
    ) -> Result<StatusChange>;

    /// Moves an order to a new status and appends the change to its history.
    ///
    /// Returns the status the order had before.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderStatus> {
        Ok(self.change_status(order_id, status, None).await?.previous)
    }

    /// Retrieves an order header.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Retrieves an order detail.
    ///
    /// Returns None if the detail doesn't exist.
    async fn get_detail(&self, detail_id: DetailId) -> Result<Option<OrderDetailRecord>>;

    /// Lists a user's orders joined with their details, newest first.
    ///
    /// Fails with `CorruptData` if any matching detail cannot be decoded.
    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryRecord>>;
}

/// Access to events staged by [`OrderStore::save_checkout`] and
/// [`OrderStore::change_status`].
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns unpublished messages created at or before `older_than` that
    /// have failed fewer than `max_attempts` times, oldest first.
    async fn list_unpublished(
        &self,
        limit: usize,
        older_than: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Vec<OutboxMessage>>;

    /// Marks a message as published. Marking it twice is a no-op.
    async fn mark_published(&self, id: i64) -> Result<()>;

    /// Counts a failed publish attempt and returns the new count.
    async fn record_publish_attempt(&self, id: i64) -> Result<i32>;
}

/// A store able to back the whole checkout pipeline.
pub trait CheckoutStore: OrderStore + IdempotencyGuard + OutboxStore {}

impl<T: OrderStore + IdempotencyGuard + OutboxStore + ?Sized> CheckoutStore for T {}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order together with its detail.
    async fn load_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(OrderRecord, OrderDetailRecord)>> {
        let Some(order) = self.get_order(order_id).await? else {
            return Ok(None);
        };
        let detail = self
            .get_detail(order.order_detail_id)
            .await?
            .ok_or(crate::StoreError::DetailNotFound(order.order_detail_id))?;
        Ok(Some((order, detail)))
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
