//! Rows stored by the order store and the shapes used to create them.

use chrono::{DateTime, Utc};
use common::{DetailId, OrderId, UserId};
use domain::{
    CheckoutItem, OrderSnapshot, OrderStatus, SNAPSHOT_SCHEMA_VERSION, StatusHistoryEntry,
};
use serde::Serialize;

use crate::{Result, StoreError, outbox::OutboxFactory, outbox::OutboxMessage};

/// Header of an order to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub amount: f64,
    pub total_qty: i64,
    pub payment_method: String,
    pub shipping_address: String,
    pub status: OrderStatus,
}

/// Detail row to be inserted next to a [`NewOrder`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderDetail {
    pub products: String,
    pub order_history: String,
    pub schema_version: i16,
}

impl NewOrderDetail {
    /// Encodes a snapshot at the current schema version.
    pub fn from_snapshot(snapshot: &OrderSnapshot) -> Result<Self> {
        Ok(Self {
            products: snapshot.encode_products()?,
            order_history: snapshot.encode_history()?,
            schema_version: SNAPSHOT_SCHEMA_VERSION,
        })
    }
}

/// Everything written by one checkout, committed together or not at all.
pub struct CheckoutWrite {
    pub order: NewOrder,
    pub detail: NewOrderDetail,
    /// Recorded in the same transaction; a token seen before fails the write.
    pub idempotency_token: Option<String>,
    /// Builds the outbox message once the order id is known.
    pub outbox: Option<OutboxFactory>,
}

impl CheckoutWrite {
    pub fn new(order: NewOrder, detail: NewOrderDetail) -> Self {
        Self {
            order,
            detail,
            idempotency_token: None,
            outbox: None,
        }
    }

    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    pub fn with_outbox(mut self, factory: OutboxFactory) -> Self {
        self.outbox = Some(factory);
        self
    }
}

/// Identifiers assigned by a successful [`CheckoutWrite`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedCheckout {
    pub order_id: OrderId,
    pub detail_id: DetailId,
    pub outbox_message: Option<OutboxMessage>,
}

/// Result of a status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// Status the order had before the change.
    pub previous: OrderStatus,
    /// Outbox row staged in the same transaction, if one was requested.
    pub outbox_message: Option<OutboxMessage>,
}

/// A stored order header.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub amount: f64,
    pub total_qty: i64,
    pub payment_method: String,
    pub shipping_address: String,
    pub status: OrderStatus,
    pub order_detail_id: DetailId,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// A stored order detail with its blobs still encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetailRecord {
    pub id: DetailId,
    pub products: String,
    pub order_history: String,
    pub schema_version: i16,
}

impl OrderDetailRecord {
    /// Decodes the line items and history.
    pub fn snapshot(&self) -> Result<OrderSnapshot> {
        OrderSnapshot::decode(&self.products, &self.order_history, self.schema_version)
            .map_err(|e| StoreError::corrupt(format_args!("order detail {}", self.id), e))
    }

    /// Decodes only the line items.
    pub fn line_items(&self) -> Result<Vec<CheckoutItem>> {
        domain::decode_products(&self.products, self.schema_version)
            .map_err(|e| StoreError::corrupt(format_args!("order detail {}", self.id), e))
    }
}

/// One order as shown in a user's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderHistoryRecord {
    pub order_id: OrderId,
    pub total_amount: f64,
    pub total_qty: i64,
    pub payment_method: String,
    pub shipping_address: String,
    pub products: Vec<CheckoutItem>,
    pub history: Vec<StatusHistoryEntry>,
    pub status: OrderStatus,
}

impl OrderHistoryRecord {
    /// Joins an order header with its decoded detail.
    pub fn from_parts(order: &OrderRecord, detail: &OrderDetailRecord) -> Result<Self> {
        let snapshot = detail.snapshot().map_err(|e| match e {
            StoreError::CorruptData(msg) => {
                StoreError::CorruptData(format!("order {}: {msg}", order.id))
            }
            other => other,
        })?;

        Ok(Self {
            order_id: order.id,
            total_amount: order.amount,
            total_qty: order.total_qty,
            payment_method: order.payment_method.clone(),
            shipping_address: order.shipping_address.clone(),
            products: snapshot.products,
            history: snapshot.history,
            status: order.status,
        })
    }
}

/// Maps a stored status code, rejecting codes outside the known range.
pub(crate) fn status_from_code(order_id: OrderId, code: i16) -> Result<OrderStatus> {
    OrderStatus::from_code(code).ok_or_else(|| {
        StoreError::corrupt(format_args!("order {order_id}"), format_args!("unknown status code {code}"))
    })
}
