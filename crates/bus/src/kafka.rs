//! Kafka transport built on rdkafka.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    ClientConfig, Message, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer, StreamConsumer},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};

use crate::{BusError, BusMessage, EventBus, Result, Subscription};

/// Kafka-backed event bus.
///
/// Producers wait for acknowledgement from all in-sync replicas. Consumers run
/// with auto-commit disabled; see [`Subscription::commit`].
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    auto_offset_reset: String,
}

impl KafkaEventBus {
    /// Creates a bus with default settings.
    pub fn new(brokers: &str) -> Result<Self> {
        Self::builder().brokers(brokers).build()
    }

    pub fn builder() -> KafkaEventBusBuilder {
        KafkaEventBusBuilder::default()
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for [`KafkaEventBus`].
#[derive(Debug, Default)]
pub struct KafkaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl KafkaEventBusBuilder {
    /// Comma-separated bootstrap servers.
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer `acks` setting. Defaults to `all`.
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// How long a publish waits for acknowledgement. Defaults to 5 seconds.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Where a new consumer group starts reading. Defaults to `earliest`.
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    pub fn build(self) -> Result<KafkaEventBus> {
        let brokers = self
            .brokers
            .filter(|brokers| !brokers.trim().is_empty())
            .ok_or_else(|| BusError::Connection("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create producer: {e}")))?;

        tracing::info!(brokers = %brokers, acks = %acks, "Kafka event bus created");

        Ok(KafkaEventBus {
            producer,
            brokers,
            timeout,
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(topic, key, partition, offset, "Message published");
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(topic, key, error = %kafka_error, "Failed to publish message");
                Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, topics: &[&str], group: &str) -> Result<Box<dyn Subscription>> {
        let subscribe_error = |reason: String| BusError::Subscribe {
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| subscribe_error(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(topics)
            .map_err(|e| subscribe_error(format!("Failed to subscribe to topics: {e}")))?;

        tracing::info!(?topics, group, "Subscribed to topics");

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next_message(&mut self) -> Option<Result<BusMessage>> {
        let received = match self.consumer.recv().await {
            Ok(message) => Ok(BusMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
            Err(e) => Err(BusError::Receive(e.to_string())),
        };
        Some(received)
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<()> {
        // The committed offset is the next one to read.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| BusError::Commit(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))
    }
}
