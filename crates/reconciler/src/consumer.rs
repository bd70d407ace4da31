//! The payment settlement consumer.

use std::sync::Arc;
use std::time::Duration;

use bus::{BusMessage, EventBus};
use checkout::EventPublisher;
use chrono::Utc;
use common::OrderId;
use domain::{
    CheckoutItem, OrderStatus, PAYMENT_DEAD_LETTER_TOPIC, PAYMENT_SUCCESS_TOPIC, PaymentSettledEvent,
    ProductStockUpdatedEvent,
};
use order_store::{
    NewOutboxMessage, OrderStore, OutboxMessage, OutboxStore, StatusOutboxFactory, StoreError,
};
use tokio_util::sync::CancellationToken;

use crate::dead_letter::DeadLetter;
use crate::error::{ConsumerError, Result};

/// Consumer group shared by all instances of the service.
pub const DEFAULT_CONSUMER_GROUP: &str = "orderfc";

/// Settings for [`PaymentSettledConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    pub group: String,
    pub dead_letter_topic: String,
    /// Attempts per message, including the first.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: PAYMENT_SUCCESS_TOPIC.to_string(),
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            dead_letter_topic: PAYMENT_DEAD_LETTER_TOPIC.to_string(),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Order completed and stock update published.
    Completed,
    /// Order completed; its stock update stays in the outbox for the
    /// dispatcher because publishing it kept failing.
    Deferred,
    /// The order was already completed; its stock update was staged then.
    Duplicate,
    /// Routed to the dead-letter topic.
    DeadLettered,
    /// Shutdown interrupted a retry, or the dead-letter publish failed.
    /// The offset must not be committed.
    Abandoned,
}

impl ProcessOutcome {
    pub fn should_commit(self) -> bool {
        !matches!(self, ProcessOutcome::Abandoned)
    }

    fn label(self) -> &'static str {
        match self {
            ProcessOutcome::Completed => "completed",
            ProcessOutcome::Deferred => "deferred",
            ProcessOutcome::Duplicate => "duplicate",
            ProcessOutcome::DeadLettered => "dead_lettered",
            ProcessOutcome::Abandoned => "abandoned",
        }
    }
}

/// Completes orders whose payment settled and forwards the stock movement.
///
/// Per message: mark the order completed and stage `ProductStockUpdated` in
/// the outbox in one store transaction, publish the staged row, then commit
/// the offset. Transient failures are retried from the step that failed.
/// Once the row is staged the message is never dead-lettered: a publish that
/// keeps failing is left to the outbox dispatcher. A failure before that
/// point that is permanent, or still failing after the last attempt, sends
/// the message to the dead-letter topic. If even that fails the consumer
/// stops without committing.
pub struct PaymentSettledConsumer<S, B>
where
    S: OrderStore + OutboxStore,
    B: EventBus,
{
    store: Arc<S>,
    bus: Arc<B>,
    publisher: EventPublisher<B>,
    config: ConsumerConfig,
}

/// Steps already done for the message being processed.
#[derive(Debug, Default)]
struct Progress {
    order_id: Option<OrderId>,
    staged: Option<OutboxMessage>,
}

enum StepResult {
    Published,
    AlreadyCompleted,
}

impl<S, B> PaymentSettledConsumer<S, B>
where
    S: OrderStore + OutboxStore,
    B: EventBus,
{
    pub fn new(store: Arc<S>, bus: Arc<B>, config: ConsumerConfig) -> Self {
        let publisher = EventPublisher::new(Arc::clone(&bus));
        Self {
            store,
            bus,
            publisher,
            config,
        }
    }

    /// Subscribes and processes messages until `shutdown` is cancelled or the
    /// subscription closes. A message being processed when shutdown is
    /// requested is finished first.
    ///
    /// Fails with [`ConsumerError::Stalled`] when a message can be neither
    /// processed nor dead-lettered, leaving its offset uncommitted.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let topic = self.config.topic.as_str();
        let mut subscription = self
            .bus
            .subscribe(&[topic], &self.config.group)
            .await?;

        tracing::info!(topic, group = %self.config.group, "Payment consumer started");

        loop {
            let next = tokio::select! {
                next = subscription.next_message() => next,
                _ = shutdown.cancelled() => {
                    tracing::info!("Payment consumer received shutdown signal");
                    break;
                }
            };

            let Some(next) = next else {
                tracing::info!("Payment subscription closed");
                break;
            };

            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive payment message");
                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_backoff) => false,
                        _ = shutdown.cancelled() => true,
                    };
                    if interrupted {
                        tracing::info!("Payment consumer received shutdown signal");
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.handle_message(&message, &shutdown).await;
            if !outcome.should_commit() {
                if shutdown.is_cancelled() {
                    break;
                }
                tracing::error!(
                    partition = message.partition,
                    offset = message.offset,
                    "Payment message could not be settled, stopping consumer"
                );
                return Err(ConsumerError::Stalled {
                    partition: message.partition,
                    offset: message.offset,
                });
            }

            if let Err(e) = subscription.commit(&message).await {
                tracing::warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to commit offset (message may be redelivered)"
                );
            }
        }

        Ok(())
    }

    /// Processes one message, retrying and dead-lettering as needed.
    #[tracing::instrument(skip(self, message, shutdown), fields(partition = message.partition, offset = message.offset))]
    pub async fn handle_message(
        &self,
        message: &BusMessage,
        shutdown: &CancellationToken,
    ) -> ProcessOutcome {
        let mut progress = Progress::default();
        let mut attempt = 1;

        let outcome = loop {
            match self.try_process(message, &mut progress).await {
                Ok(StepResult::Published) => break ProcessOutcome::Completed,
                Ok(StepResult::AlreadyCompleted) => {
                    tracing::info!(order_id = ?progress.order_id, "Order already completed, skipping");
                    break ProcessOutcome::Duplicate;
                }
                Err(e)
                    if progress.staged.is_some()
                        && (e.is_permanent() || attempt >= self.config.max_attempts) =>
                {
                    tracing::warn!(
                        order_id = ?progress.order_id,
                        attempt,
                        error = %e,
                        "Stock update publish failed, leaving it to the outbox dispatcher"
                    );
                    break ProcessOutcome::Deferred;
                }
                Err(e) if e.is_permanent() || attempt >= self.config.max_attempts => {
                    tracing::error!(
                        order_id = ?progress.order_id,
                        attempt,
                        permanent = e.is_permanent(),
                        error = %e,
                        "Payment message failed, routing to dead-letter topic"
                    );
                    break self.dead_letter(message, &e, attempt).await;
                }
                Err(e) => {
                    tracing::warn!(order_id = ?progress.order_id, attempt, error = %e, "Payment message failed, retrying");
                    let backoff = self.config.retry_backoff * attempt;
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.cancelled() => {
                            tracing::info!("Retry interrupted by shutdown");
                            // A staged stock update is already durable.
                            break if progress.staged.is_some() {
                                ProcessOutcome::Deferred
                            } else {
                                ProcessOutcome::Abandoned
                            };
                        }
                    }
                    attempt += 1;
                }
            }
        };

        metrics::counter!("payment_events_processed_total", "outcome" => outcome.label())
            .increment(1);
        outcome
    }

    async fn try_process(&self, message: &BusMessage, progress: &mut Progress) -> Result<StepResult> {
        let order_id = match progress.order_id {
            Some(order_id) => order_id,
            None => {
                let event: PaymentSettledEvent = serde_json::from_slice(&message.payload)?;
                progress.order_id = Some(event.order_id);
                event.order_id
            }
        };

        if progress.staged.is_none() {
            let stage: StatusOutboxFactory = Box::new(|order_id: OrderId, items: Vec<CheckoutItem>| {
                NewOutboxMessage::for_event(&ProductStockUpdatedEvent::from_items(
                    order_id,
                    &items,
                    Utc::now(),
                ))
            });
            match self
                .store
                .change_status(order_id, OrderStatus::Completed, Some(stage))
                .await
            {
                Ok(change) => {
                    let staged = change
                        .outbox_message
                        .ok_or(ConsumerError::NothingStaged(order_id))?;
                    progress.staged = Some(staged);
                }
                Err(StoreError::InvalidTransition {
                    from: OrderStatus::Completed,
                    ..
                }) => return Ok(StepResult::AlreadyCompleted),
                Err(e) => return Err(e.into()),
            }
        }

        let Some(staged) = progress.staged.as_ref() else {
            return Err(ConsumerError::NothingStaged(order_id));
        };

        if let Err(e) = self.publisher.publish_outbox(staged).await {
            if let Err(store_err) = self.store.record_publish_attempt(staged.id).await {
                tracing::warn!(outbox_id = staged.id, error = %store_err, "Failed to record publish attempt");
            }
            return Err(e.into());
        }

        if let Err(e) = self.store.mark_published(staged.id).await {
            tracing::warn!(
                outbox_id = staged.id,
                error = %e,
                "Failed to mark stock update published (dispatcher may send it again)"
            );
        }

        tracing::info!(%order_id, outbox_id = staged.id, "Order completed, stock update published");
        Ok(StepResult::Published)
    }

    async fn dead_letter(
        &self,
        message: &BusMessage,
        error: &ConsumerError,
        attempts: u32,
    ) -> ProcessOutcome {
        let letter = DeadLetter::new(message, error, attempts);
        let payload = match serde_json::to_vec(&letter) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode dead letter");
                return ProcessOutcome::Abandoned;
            }
        };

        match self
            .publisher
            .publish_raw(&self.config.dead_letter_topic, &letter.partition_key(), &payload)
            .await
        {
            Ok(()) => {
                metrics::counter!("payment_events_dead_lettered_total").increment(1);
                ProcessOutcome::DeadLettered
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to publish dead letter");
                ProcessOutcome::Abandoned
            }
        }
    }
}
