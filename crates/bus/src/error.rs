use thiserror::Error;

/// Errors raised by a message bus transport.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The transport could not be set up.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A message was not acknowledged by the broker.
    #[error("Publish failed for topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribing to topics failed.
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    Subscribe { topics: Vec<String>, reason: String },

    /// Receiving the next message failed.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Committing a consumed offset failed.
    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
