//! Ordered-log transport.
//!
//! This module contains:
//! - `LogPublisher` trait: append a keyed record to a topic
//! - `LogSubscriber` / `LogConsumer` traits: pull records for a consumer group
//!   and settle each one with ack, nack or skip
//! - `consumer`: the loop that drives a `MessageHandler` over a `LogConsumer`
//! - Implementations: in-process channel log, Kafka, Mock
//!
//! Records with the same key land on the same partition and are delivered
//! to a group in append order, one at a time per partition.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::{ConfigError, MessagingConfig, MessagingType};

// Implementation modules
#[cfg(feature = "channel")]
pub mod channel;
pub mod consumer;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;

// Re-exports
#[cfg(feature = "channel")]
pub use channel::{ChannelConsumer, InMemoryLog};
pub use consumer::{
    run_consumer, spawn_consumer, ConsumerHandle, LoopSettings, MessageHandler, Outcome,
};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaLog, KafkaLogConfig};
pub use mock::{MockConsumer, MockPublisher, PublishedRecord, Settlement};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Offset commit failed: {0}")]
    Commit(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One record handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Producer side of the log.
///
/// Implementations:
/// - `InMemoryLog`: in-process partitioned log
/// - `KafkaLog`: Apache Kafka
/// - `MockPublisher`: recording mock for testing
#[async_trait]
pub trait LogPublisher: Send + Sync {
    /// Append `payload` to `topic` under `key`.
    ///
    /// Returns once the record is durable in the log.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize + ?Sized + Sync>(
    publisher: &dyn LogPublisher,
    topic: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    publisher.publish(topic, key, payload).await
}

/// Pull consumer bound to one topic and consumer group.
#[async_trait]
pub trait LogConsumer: Send {
    /// Wait for the next record.
    ///
    /// Dropping the returned future before it completes claims nothing.
    async fn fetch(&mut self) -> Result<Delivery>;

    /// Mark the record processed; its offset is committed.
    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Release the record so the same one is delivered again.
    async fn nack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Move past the record without committing it.
    async fn skip(&mut self, delivery: &Delivery) -> Result<()>;
}

/// Factory for consumers.
#[async_trait]
pub trait LogSubscriber: Send + Sync {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn LogConsumer>>;
}

/// A connected transport: one publisher plus a consumer factory.
#[derive(Clone)]
pub struct Transport {
    pub publisher: Arc<dyn LogPublisher>,
    pub subscriber: Arc<dyn LogSubscriber>,
}

impl Transport {
    pub fn new(publisher: Arc<dyn LogPublisher>, subscriber: Arc<dyn LogSubscriber>) -> Self {
        Self {
            publisher,
            subscriber,
        }
    }

    /// Both halves backed by the same log.
    pub fn from_log<L>(log: Arc<L>) -> Self
    where
        L: LogPublisher + LogSubscriber + 'static,
    {
        Self {
            publisher: log.clone(),
            subscriber: log,
        }
    }
}

/// Errors raised while bringing the transport up at startup.
#[derive(Debug, thiserror::Error)]
pub enum TransportInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Initialize the transport based on configuration.
pub async fn init_transport(
    config: &MessagingConfig,
) -> std::result::Result<Transport, TransportInitError> {
    match config.messaging_type {
        MessagingType::Channel => {
            #[cfg(feature = "channel")]
            {
                info!(
                    messaging_type = "channel",
                    partitions = config.channel.partitions,
                    "Initializing transport"
                );
                Ok(Transport::from_log(Arc::new(InMemoryLog::new(
                    config.channel.partitions,
                ))))
            }

            #[cfg(not(feature = "channel"))]
            {
                Err(ConfigError::FeatureNotEnabled {
                    backend: "channel",
                    feature: "channel",
                }
                .into())
            }
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka_config = KafkaLogConfig::from_config(&config.kafka)?;
                info!(
                    messaging_type = "kafka",
                    bootstrap_servers = %kafka_config.bootstrap_servers,
                    "Initializing transport"
                );
                Ok(Transport::from_log(Arc::new(KafkaLog::new(kafka_config)?)))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err(ConfigError::FeatureNotEnabled {
                    backend: "kafka",
                    feature: "kafka",
                }
                .into())
            }
        }
    }
}
