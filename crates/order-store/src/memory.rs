use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DetailId, OrderId};
use domain::{OrderStatus, StatusHistoryEntry};
use tokio::sync::RwLock;

use crate::{
    CheckoutWrite, HistoryQuery, NewOutboxMessage, OrderDetailRecord, OrderHistoryRecord,
    OrderRecord, OutboxMessage, Result, SavedCheckout, StatusChange, StatusOutboxFactory,
    StoreError,
    store::{IdempotencyGuard, OrderStore, OutboxStore},
};

#[derive(Debug, Clone, Default)]
struct State {
    orders: BTreeMap<OrderId, OrderRecord>,
    details: BTreeMap<DetailId, OrderDetailRecord>,
    tokens: HashSet<String>,
    outbox: BTreeMap<i64, OutboxMessage>,
    last_order_id: i64,
    last_detail_id: i64,
    last_outbox_id: i64,
}

impl State {
    fn push_outbox(&mut self, message: NewOutboxMessage, now: DateTime<Utc>) -> OutboxMessage {
        self.last_outbox_id += 1;
        let stored = OutboxMessage {
            id: self.last_outbox_id,
            event_id: message.event_id,
            topic: message.topic,
            partition_key: message.partition_key,
            payload: message.payload,
            created_at: now,
            published_at: None,
            attempts: 0,
        };
        self.outbox.insert(stored.id, stored.clone());
        stored
    }
}

#[derive(Default)]
struct Faults {
    fail_after_detail_insert: AtomicBool,
    failing_status_updates: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl Faults {
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory order store implementation for testing.
///
/// Writes are staged on a copy of the state and swapped in only when every
/// step succeeded, giving the same all-or-nothing behaviour as a database
/// transaction. Failures can be injected at chosen points.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes checkouts fail after the detail insert, before the order insert.
    pub fn set_fail_after_detail_insert(&self, fail: bool) {
        self.faults
            .fail_after_detail_insert
            .store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` status updates fail with a transient error.
    pub fn fail_next_status_updates(&self, count: usize) {
        self.faults
            .failing_status_updates
            .store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` order or detail reads fail with a transient error.
    pub fn fail_next_reads(&self, count: usize) {
        self.faults.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored order details.
    pub async fn detail_count(&self) -> usize {
        self.state.read().await.details.len()
    }

    /// Returns the number of recorded idempotency tokens.
    pub async fn token_count(&self) -> usize {
        self.state.read().await.tokens.len()
    }

    /// Returns every outbox message, published or not.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.values().cloned().collect()
    }

    /// Overwrites the stored line items of a detail.
    pub async fn overwrite_products(&self, detail_id: DetailId, products: impl Into<String>) {
        if let Some(detail) = self.state.write().await.details.get_mut(&detail_id) {
            detail.products = products.into();
        }
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }

    fn check_read(&self) -> Result<()> {
        if Faults::take(&self.faults.failing_reads) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryOrderStore {
    async fn check_token(&self, token: &str) -> Result<bool> {
        Ok(self.state.read().await.tokens.contains(token))
    }

    async fn record_token(&self, token: &str) -> Result<()> {
        if !self.state.write().await.tokens.insert(token.to_string()) {
            return Err(StoreError::DuplicateToken(token.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save_checkout(&self, write: CheckoutWrite) -> Result<SavedCheckout> {
        let CheckoutWrite {
            order,
            detail,
            idempotency_token,
            outbox,
        } = write;

        let mut state = self.state.write().await;
        let mut staged = state.clone();

        if let Some(token) = idempotency_token
            && !staged.tokens.insert(token.clone())
        {
            return Err(StoreError::DuplicateToken(token));
        }

        staged.last_detail_id += 1;
        let detail_id = DetailId::new(staged.last_detail_id);
        staged.details.insert(
            detail_id,
            OrderDetailRecord {
                id: detail_id,
                products: detail.products,
                order_history: detail.order_history,
                schema_version: detail.schema_version,
            },
        );

        if self.faults.fail_after_detail_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected failure inserting order".to_string(),
            ));
        }

        staged.last_order_id += 1;
        let order_id = OrderId::new(staged.last_order_id);
        let now = Utc::now();
        staged.orders.insert(
            order_id,
            OrderRecord {
                id: order_id,
                user_id: order.user_id,
                amount: order.amount,
                total_qty: order.total_qty,
                payment_method: order.payment_method,
                shipping_address: order.shipping_address,
                status: order.status,
                order_detail_id: detail_id,
                create_time: now,
                update_time: now,
            },
        );

        let outbox_message = match outbox {
            Some(factory) => {
                let message = factory(order_id)?;
                Some(staged.push_outbox(message, now))
            }
            None => None,
        };

        *state = staged;

        Ok(SavedCheckout {
            order_id,
            detail_id,
            outbox_message,
        })
    }

    async fn change_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        outbox: Option<StatusOutboxFactory>,
    ) -> Result<StatusChange> {
        if Faults::take(&self.faults.failing_status_updates) {
            return Err(StoreError::Unavailable(
                "injected status update failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let order = state
            .orders
            .get(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let current = order.status;
        let detail_id = order.order_detail_id;

        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                order_id,
                from: current,
                to: status,
            });
        }

        let now = Utc::now();
        let detail = state
            .details
            .get(&detail_id)
            .ok_or(StoreError::DetailNotFound(detail_id))?;
        let history = domain::append_history(
            &detail.order_history,
            detail.schema_version,
            StatusHistoryEntry::new(status, now),
        )
        .map_err(|e| StoreError::corrupt(format_args!("order {order_id}"), e))?;

        let message = match outbox {
            Some(factory) => {
                let items = detail.line_items()?;
                Some(factory(order_id, items)?)
            }
            None => None,
        };

        if let Some(detail) = state.details.get_mut(&detail_id) {
            detail.order_history = history;
        }
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.status = status;
            order.update_time = now;
        }
        let outbox_message = message.map(|message| state.push_outbox(message, now));

        Ok(StatusChange {
            previous: current,
            outbox_message,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        self.check_read()?;
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_detail(&self, detail_id: DetailId) -> Result<Option<OrderDetailRecord>> {
        self.check_read()?;
        Ok(self.state.read().await.details.get(&detail_id).cloned())
    }

    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryRecord>> {
        self.check_read()?;
        let state = self.state.read().await;

        let matching = state
            .orders
            .values()
            .rev()
            .filter(|order| query.matches(order.user_id, order.status))
            .take(query.limit.unwrap_or(usize::MAX));

        matching
            .map(|order| {
                let detail = state
                    .details
                    .get(&order.order_detail_id)
                    .ok_or(StoreError::DetailNotFound(order.order_detail_id))?;
                OrderHistoryRecord::from_parts(order, detail)
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderStore {
    async fn list_unpublished(
        &self,
        limit: usize,
        older_than: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Vec<OutboxMessage>> {
        Ok(self
            .state
            .read()
            .await
            .outbox
            .values()
            .filter(|message| {
                !message.is_published()
                    && message.created_at <= older_than
                    && message.attempts < max_attempts
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .get_mut(&id)
            .ok_or(StoreError::OutboxMessageNotFound(id))?;
        message.published_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn record_publish_attempt(&self, id: i64) -> Result<i32> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .get_mut(&id)
            .ok_or(StoreError::OutboxMessageNotFound(id))?;
        message.attempts += 1;
        Ok(message.attempts)
    }
}
