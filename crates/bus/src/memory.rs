use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::{BusError, BusMessage, EventBus, PublishedMessage, Result, Subscription};

#[derive(Default)]
struct Topic {
    next_offset: i64,
    backlog: Vec<BusMessage>,
    subscribers: Vec<mpsc::UnboundedSender<BusMessage>>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, Topic>,
    published: Vec<PublishedMessage>,
    commits: Vec<(String, i32, i64)>,
    fail_all: bool,
    failing_topics: HashSet<String>,
    failing_publishes: usize,
    failing_receives: usize,
    closed: bool,
}

impl Inner {
    fn deliver(&mut self, topic: &str, key: Option<String>, payload: Vec<u8>) -> BusMessage {
        let entry = self.topics.entry(topic.to_string()).or_default();
        let message = BusMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: entry.next_offset,
            key,
            payload,
        };
        entry.next_offset += 1;

        entry
            .subscribers
            .retain(|subscriber| subscriber.send(message.clone()).is_ok());
        if entry.subscribers.is_empty() {
            entry.backlog.push(message.clone());
        }
        message
    }
}

/// In-memory event bus for testing.
///
/// Every accepted publish is recorded and delivered to subscribers of the
/// topic. Messages sent to a topic nobody subscribed to yet are held back and
/// handed to the first subscriber. All topics have a single partition.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail while set.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.inner.lock().await.fail_all = fail;
    }

    /// Makes publishes to one topic fail while set.
    pub async fn set_fail_on_topic(&self, topic: &str, fail: bool) {
        let mut inner = self.inner.lock().await;
        if fail {
            inner.failing_topics.insert(topic.to_string());
        } else {
            inner.failing_topics.remove(topic);
        }
    }

    /// Makes the next `count` publishes fail, whatever their topic.
    pub async fn fail_next_publishes(&self, count: usize) {
        self.inner.lock().await.failing_publishes = count;
    }

    /// Makes the next `count` receives on any subscription fail.
    pub async fn fail_next_receives(&self, count: usize) {
        self.inner.lock().await.failing_receives = count;
    }

    /// Sends a message as an external producer would, bypassing failure injection.
    pub async fn inject(&self, topic: &str, key: Option<&str>, payload: impl Into<Vec<u8>>) -> i64 {
        self.inner
            .lock()
            .await
            .deliver(topic, key.map(str::to_owned), payload.into())
            .offset
    }

    /// Returns every accepted publish in order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().await.published.clone()
    }

    /// Returns the accepted publishes to one topic.
    pub async fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.inner
            .lock()
            .await
            .published
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns committed `(topic, partition, offset)` triples in commit order.
    pub async fn commits(&self) -> Vec<(String, i32, i64)> {
        self.inner.lock().await.commits.clone()
    }

    /// Closes all subscriptions, current and future, once their pending
    /// messages are drained.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        for topic in inner.topics.values_mut() {
            topic.subscribers.clear();
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let injected = inner.failing_publishes > 0;
        if injected {
            inner.failing_publishes -= 1;
        }
        if injected || inner.fail_all || inner.failing_topics.contains(topic) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }

        inner.published.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        inner.deliver(topic, Some(key.to_string()), payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str], _group: &str) -> Result<Box<dyn Subscription>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        let closed = inner.closed;

        for topic in topics {
            let entry = inner.topics.entry((*topic).to_string()).or_default();
            for message in entry.backlog.drain(..) {
                // Cannot fail while `receiver` is held.
                let _ = sender.send(message);
            }
            if !closed {
                entry.subscribers.push(sender.clone());
            }
        }

        Ok(Box::new(InMemorySubscription {
            receiver,
            bus: Arc::clone(&self.inner),
        }))
    }
}

struct InMemorySubscription {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
    bus: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_message(&mut self) -> Option<Result<BusMessage>> {
        {
            let mut bus = self.bus.lock().await;
            if bus.failing_receives > 0 {
                bus.failing_receives -= 1;
                return Some(Err(BusError::Receive("injected receive failure".to_string())));
            }
        }
        self.receiver.recv().await.map(Ok)
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<()> {
        self.bus.lock().await.commits.push((
            message.topic.clone(),
            message.partition,
            message.offset,
        ));
        Ok(())
    }
}
