use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Message has no payload")]
    NoPayload,
}

/// A sequential stream of raw inbound messages.
///
/// Messages are handed out one at a time; the caller finishes with one
/// before asking for the next.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message payload. `Ok(None)` means the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<Vec<u8>>, ConsumerError>;
}

/// Kafka consumer subscribed to the order topic
pub struct OrderConsumer {
    consumer: StreamConsumer,
}

impl OrderConsumer {
    /// Create a new Kafka consumer and subscribe to `topics`
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> Result<Self, ConsumerError> {
        info!(
            "Creating Kafka consumer with group_id: {}, topics: {:?}",
            group_id, topics
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", brokers)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        consumer.subscribe(topics)?;

        info!("Kafka consumer created successfully");
        Ok(Self { consumer })
    }

    /// Stop receiving new assignments
    pub fn close(&self) {
        self.consumer.unsubscribe();
        info!("Kafka consumer unsubscribed");
    }
}

#[async_trait]
impl MessageSource for OrderConsumer {
    async fn next_message(&mut self) -> Result<Option<Vec<u8>>, ConsumerError> {
        match self.consumer.recv().await {
            Ok(message) => {
                debug!(
                    "Received message from topic: {}, partition: {}, offset: {}",
                    message.topic(),
                    message.partition(),
                    message.offset()
                );

                match message.payload() {
                    Some(payload) => Ok(Some(payload.to_vec())),
                    None => {
                        warn!("Message has no payload");
                        Err(ConsumerError::NoPayload)
                    }
                }
            }
            Err(e) => {
                error!("Kafka error while receiving: {}", e);
                Err(ConsumerError::Kafka(e))
            }
        }
    }
}
