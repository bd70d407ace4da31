//! The checkout orchestrator.

use std::sync::Arc;
use std::time::Instant;

use bus::EventBus;
use chrono::Utc;
use common::OrderId;
use domain::{CheckoutItem, CheckoutRequest, OrderCreatedEvent, OrderSnapshot, OrderStatus};
use order_store::{CheckoutStore, CheckoutWrite, NewOrder, NewOrderDetail, NewOutboxMessage};

use crate::catalog::ProductCatalog;
use crate::error::{CheckoutError, Result};
use crate::publisher::EventPublisher;

/// Turns checkout requests into persisted orders and `OrderCreated` events.
///
/// The order, its detail, the idempotency token and the outbox row are
/// committed in one transaction. The event is published after the commit; if
/// that fails the caller gets [`CheckoutError::EventPublishFailed`] and the
/// outbox row stays behind for the dispatcher.
pub struct CheckoutService<S, B>
where
    S: CheckoutStore,
    B: EventBus,
{
    store: Arc<S>,
    publisher: EventPublisher<B>,
    catalog: Option<Arc<dyn ProductCatalog>>,
}

impl<S, B> Clone for CheckoutService<S, B>
where
    S: CheckoutStore,
    B: EventBus,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: self.publisher.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<S, B> CheckoutService<S, B>
where
    S: CheckoutStore,
    B: EventBus,
{
    /// Creates a service that does not consult a product catalog.
    pub fn new(store: Arc<S>, publisher: EventPublisher<B>) -> Self {
        Self {
            store,
            publisher,
            catalog: None,
        }
    }

    /// Rejects products the catalog does not know.
    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Processes a checkout and returns the new order's id.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, items = request.items.len()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderId> {
        metrics::counter!("checkout_requests_total").increment(1);
        let start = Instant::now();

        let result = self.process(request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics::counter!("orders_created_total").increment(1),
            Err(CheckoutError::DuplicateRequest(_)) => {
                metrics::counter!("checkout_duplicates_total").increment(1)
            }
            // The order exists even though the request failed.
            Err(CheckoutError::EventPublishFailed { .. }) => {
                metrics::counter!("orders_created_total").increment(1)
            }
            Err(_) => {}
        }
        result
    }

    async fn process(&self, request: CheckoutRequest) -> Result<OrderId> {
        request.validate()?;

        let token = request.token().map(str::to_owned);
        if let Some(token) = token.as_deref()
            && self.store.check_token(token).await?
        {
            tracing::info!(token, "Duplicate checkout rejected");
            return Err(CheckoutError::DuplicateRequest(format!(
                "idempotency token '{token}' was already used"
            )));
        }

        self.check_products(&request.items).await?;

        let summary = request.summary();
        let CheckoutRequest {
            user_id,
            items,
            payment_method,
            shipping_address,
            ..
        } = request;

        let snapshot = OrderSnapshot::created(items, Utc::now());
        let detail = NewOrderDetail::from_snapshot(&snapshot)?;
        let order = NewOrder {
            user_id,
            amount: summary.total_amount,
            total_qty: summary.total_qty,
            payment_method: payment_method.clone(),
            shipping_address: shipping_address.clone(),
            status: OrderStatus::Created,
        };

        let created_event = move |order_id| {
            NewOutboxMessage::for_event(&OrderCreatedEvent {
                order_id,
                user_id,
                total_amount: summary.total_amount,
                payment_method,
                shipping_address,
            })
        };

        let mut write = CheckoutWrite::new(order, detail).with_outbox(Box::new(created_event));
        if let Some(token) = token {
            write = write.with_idempotency_token(token);
        }

        let saved = self.store.save_checkout(write).await?;
        let order_id = saved.order_id;
        tracing::info!(%order_id, total_qty = summary.total_qty, "Order created");

        let Some(message) = saved.outbox_message else {
            return Ok(order_id);
        };

        if let Err(source) = self.publisher.publish_outbox(&message).await {
            tracing::error!(%order_id, error = %source, "Failed to publish order created event");
            if let Err(e) = self.store.record_publish_attempt(message.id).await {
                tracing::warn!(outbox_id = message.id, error = %e, "Failed to record publish attempt");
            }
            return Err(CheckoutError::EventPublishFailed { order_id, source });
        }

        // A row left unmarked is published again by the dispatcher.
        if let Err(e) = self.store.mark_published(message.id).await {
            tracing::warn!(outbox_id = message.id, error = %e, "Failed to mark outbox message published");
        }

        Ok(order_id)
    }

    async fn check_products(&self, items: &[CheckoutItem]) -> Result<()> {
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };
        for item in items {
            catalog.get_product(item.product_id).await?;
        }
        Ok(())
    }
}
