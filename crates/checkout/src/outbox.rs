//! Background delivery of outbox rows whose inline publish failed.

use std::sync::Arc;
use std::time::Duration;

use bus::EventBus;
use chrono::Utc;
use order_store::{OutboxStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::publisher::EventPublisher;

/// Floor applied to the poll interval; a zero interval would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for [`OutboxDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Rows younger than this are left to the checkout that wrote them.
    pub grace_period: Duration,
    /// Publish attempts after which a row is left alone.
    pub max_attempts: i32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            grace_period: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

/// Periodically publishes unsent outbox rows.
pub struct OutboxDispatcher<S, B>
where
    S: OutboxStore,
    B: EventBus,
{
    store: Arc<S>,
    publisher: EventPublisher<B>,
    config: DispatcherConfig,
}

impl<S, B> OutboxDispatcher<S, B>
where
    S: OutboxStore,
    B: EventBus,
{
    pub fn new(store: Arc<S>, publisher: EventPublisher<B>, mut config: DispatcherConfig) -> Self {
        config.poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Publishes one batch of due rows and returns how many were delivered.
    ///
    /// A row that fails to publish has its attempt count bumped and is tried
    /// again on the next call, until it reaches `max_attempts`.
    pub async fn dispatch_once(&self) -> Result<usize, StoreError> {
        let grace = chrono::Duration::from_std(self.config.grace_period)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let due = self
            .store
            .list_unpublished(self.config.batch_size, Utc::now() - grace, self.config.max_attempts)
            .await?;

        let mut delivered = 0;
        for message in &due {
            match self.publisher.publish_outbox(message).await {
                Ok(()) => {
                    self.store.mark_published(message.id).await?;
                    metrics::counter!("outbox_dispatched_total").increment(1);
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = message.id,
                        topic = %message.topic,
                        attempts = message.attempts + 1,
                        error = %e,
                        "Outbox publish failed"
                    );
                    let attempts = self.store.record_publish_attempt(message.id).await?;
                    if attempts >= self.config.max_attempts {
                        tracing::error!(
                            outbox_id = message.id,
                            topic = %message.topic,
                            attempts,
                            "Outbox row out of attempts, giving up"
                        );
                        metrics::counter!("outbox_abandoned_total").increment(1);
                    }
                }
            }
        }

        if delivered > 0 {
            tracing::info!(delivered, pending = due.len() - delivered, "Outbox batch dispatched");
        }
        Ok(delivered)
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox dispatcher started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_once().await {
                        tracing::error!(error = %e, "Outbox dispatch failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Outbox dispatcher received shutdown signal");
                    return;
                }
            }
        }
    }
}
