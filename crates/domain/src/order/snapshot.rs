//! Serialized order detail: the write-once line items and the append-only
//! status history stored next to the mutable order header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CheckoutItem, OrderStatus};

/// Layout version written alongside every detail row.
pub const SNAPSHOT_SCHEMA_VERSION: i16 = 1;

/// Errors raised while encoding or decoding a stored snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot schema version {0}")]
    UnsupportedVersion(i16),

    #[error("line items blob is not valid: {0}")]
    Products(#[source] serde_json::Error),

    #[error("status history blob is not valid: {0}")]
    History(#[source] serde_json::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One entry of the status history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(status: OrderStatus, timestamp: DateTime<Utc>) -> Self {
        Self { status, timestamp }
    }
}

/// Decoded contents of an order detail row.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    /// Line items exactly as submitted at checkout.
    pub products: Vec<CheckoutItem>,
    /// Status changes, oldest first.
    pub history: Vec<StatusHistoryEntry>,
}

impl OrderSnapshot {
    /// Starts a snapshot for a freshly created order.
    pub fn created(products: Vec<CheckoutItem>, created_at: DateTime<Utc>) -> Self {
        Self {
            products,
            history: vec![StatusHistoryEntry::new(OrderStatus::Created, created_at)],
        }
    }

    /// Decodes the two stored blobs.
    pub fn decode(products: &str, history: &str, version: i16) -> Result<Self, SnapshotError> {
        Ok(Self {
            products: decode_products(products, version)?,
            history: decode_history(history, version)?,
        })
    }

    pub fn encode_products(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(&self.products).map_err(SnapshotError::Encode)
    }

    pub fn encode_history(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(&self.history).map_err(SnapshotError::Encode)
    }

    /// Returns the most recent status recorded in the history.
    pub fn latest_status(&self) -> Option<OrderStatus> {
        self.history.last().map(|entry| entry.status)
    }
}

fn check_version(version: i16) -> Result<(), SnapshotError> {
    if version == SNAPSHOT_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(SnapshotError::UnsupportedVersion(version))
    }
}

/// Decodes a stored line-items blob.
pub fn decode_products(blob: &str, version: i16) -> Result<Vec<CheckoutItem>, SnapshotError> {
    check_version(version)?;
    serde_json::from_str(blob).map_err(SnapshotError::Products)
}

/// Decodes a stored status history blob.
pub fn decode_history(blob: &str, version: i16) -> Result<Vec<StatusHistoryEntry>, SnapshotError> {
    check_version(version)?;
    serde_json::from_str(blob).map_err(SnapshotError::History)
}

/// Appends one entry to an encoded history blob, leaving earlier entries untouched.
pub fn append_history(
    blob: &str,
    version: i16,
    entry: StatusHistoryEntry,
) -> Result<String, SnapshotError> {
    let mut history = decode_history(blob, version)?;
    history.push(entry);
    serde_json::to_string(&history).map_err(SnapshotError::Encode)
}
