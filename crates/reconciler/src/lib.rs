//! Payment reconciliation.
//!
//! Listens for settled payments, completes the matching orders and tells the
//! stock service which products left the warehouse.

pub mod consumer;
pub mod dead_letter;
pub mod error;

pub use consumer::{ConsumerConfig, DEFAULT_CONSUMER_GROUP, PaymentSettledConsumer, ProcessOutcome};
pub use dead_letter::DeadLetter;
pub use error::{ConsumerError, Result};
