use common::{DetailId, OrderId};
use domain::{OrderStatus, SnapshotError};
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order detail does not exist.
    #[error("Order detail not found: {0}")]
    DetailNotFound(DetailId),

    /// The outbox message does not exist.
    #[error("Outbox message not found: {0}")]
    OutboxMessageNotFound(i64),

    /// The idempotency token has already been recorded.
    #[error("Idempotency token already recorded: {0}")]
    DuplicateToken(String),

    /// The requested status change is not allowed from the current status.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// An order detail could not be encoded.
    #[error("Failed to encode order detail: {0}")]
    Encode(#[from] SnapshotError),

    /// The backend refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }

    pub(crate) fn corrupt(context: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        StoreError::CorruptData(format!("{context}: {cause}"))
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
