use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to create Kafka producer: {0}")]
    ProducerCreation(String),

    #[error("Failed to serialize dead letter: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish dead letter: {0}")]
    PublishFailed(String),
}

/// A message the ingestion loop dropped, kept for manual inspection or replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    /// Which stage rejected the message, e.g. `decode` or `persist`
    pub reason: String,
    pub error: String,
    /// The original message body, lossily decoded as UTF-8
    pub payload: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(reason: &str, error: impl ToString, payload: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason: reason.to_string(),
            error: error.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            failed_at: Utc::now(),
        }
    }
}

/// Destination for dropped messages
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: &DeadLetter) -> Result<(), PublisherError>;
}

/// Kafka publisher writing dead letters to a dedicated topic
pub struct DeadLetterPublisher {
    producer: FutureProducer,
    topic: String,
}

impl DeadLetterPublisher {
    /// Create a new DeadLetterPublisher
    ///
    /// # Arguments
    /// * `brokers` - Comma-separated list of Kafka brokers (e.g., "localhost:9092")
    /// * `topic` - The dead-letter topic
    pub fn new(brokers: &str, topic: String) -> Result<Self, PublisherError> {
        info!("Creating Kafka dead-letter producer for brokers: {}", brokers);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("retries", "3")
            .create()
            .map_err(|e| PublisherError::ProducerCreation(e.to_string()))?;

        info!("Kafka dead-letter producer created for topic: {}", topic);

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterPublisher {
    async fn send(&self, letter: &DeadLetter) -> Result<(), PublisherError> {
        let payload = serde_json::to_string(letter)?;
        let key = letter.id.to_string();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                info!(
                    "Dead letter {} published to topic '{}', partition {}, offset {}",
                    letter.id, self.topic, partition, offset
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!("Failed to publish dead letter {}: {}", letter.id, err);
                Err(PublisherError::PublishFailed(err.to_string()))
            }
        }
    }
}
