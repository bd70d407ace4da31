//! Checkout error types.

use common::OrderId;
use domain::OrderError;
use order_store::StoreError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::publisher::PublishError;

/// Errors returned to the caller of a checkout or history query.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request violates a validation rule. Not retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The idempotency token was already used. Not retried.
    #[error("Duplicate request: {0}")]
    DuplicateRequest(String),

    /// The product catalog could not be reached. The caller may retry.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The transaction was aborted; nothing was persisted.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),

    /// The order was committed but its created event was not published.
    #[error("Order {order_id} was created but its event could not be published: {source}")]
    EventPublishFailed {
        order_id: OrderId,
        #[source]
        source: PublishError,
    },

    /// A stored blob could not be decoded.
    #[error("Corrupt data: {0}")]
    CorruptData(String),
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        CheckoutError::InvalidRequest(err.to_string())
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateToken(token) => CheckoutError::DuplicateRequest(format!(
                "idempotency token '{token}' was already used"
            )),
            StoreError::CorruptData(msg) => CheckoutError::CorruptData(msg),
            other => CheckoutError::PersistenceFailure(other),
        }
    }
}

impl From<CatalogError> for CheckoutError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(product_id) => {
                CheckoutError::InvalidRequest(format!("product {product_id} does not exist"))
            }
            other => CheckoutError::UpstreamUnavailable(other.to_string()),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
