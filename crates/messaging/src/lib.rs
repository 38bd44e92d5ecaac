pub mod consumer;
pub mod producer;

pub use consumer::{ConsumerError, MessageSource, OrderConsumer};
pub use producer::{DeadLetter, DeadLetterPublisher, DeadLetterSink, PublisherError};
