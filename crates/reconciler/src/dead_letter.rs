use bus::BusMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A payment message that could not be processed, as written to the
/// dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    /// The original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: &BusMessage, error: impl ToString, attempts: u32) -> Self {
        Self {
            source_topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            payload: message.payload_str().into_owned(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    /// Key used on the dead-letter topic; the original key when there was one.
    pub fn partition_key(&self) -> String {
        self.key
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.source_topic, self.partition))
    }
}
