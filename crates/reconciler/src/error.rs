use bus::BusError;
use checkout::PublishError;
use common::OrderId;
use order_store::StoreError;
use thiserror::Error;

/// Errors raised while handling one payment message.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The payload is not a payment settlement.
    #[error("Failed to decode payment event: {0}")]
    Decode(#[from] serde_json::Error),

    /// The status change returned without a staged stock update.
    #[error("No stock update staged for order {0}")]
    NothingStaged(OrderId),

    /// Reading or updating the order failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The stock update could not be published.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// The subscription could not be opened.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A message could be neither processed nor dead-lettered. The consumer
    /// stops so its offset stays uncommitted.
    #[error("Payment message at partition {partition} offset {offset} could not be settled")]
    Stalled { partition: i32, offset: i64 },
}

impl ConsumerError {
    /// Returns true if retrying the message cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            ConsumerError::Decode(_) | ConsumerError::NothingStaged(_) => true,
            ConsumerError::Store(e) => !e.is_transient(),
            ConsumerError::Publish(PublishError::Serialization(_)) => true,
            ConsumerError::Publish(PublishError::Transport(_)) => false,
            ConsumerError::Bus(_) => false,
            ConsumerError::Stalled { .. } => true,
        }
    }
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;
