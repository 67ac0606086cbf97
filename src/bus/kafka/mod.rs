//! Kafka ordered-log implementation.
//!
//! Topic naming: `{topic_prefix}.{topic}` when a prefix is configured,
//! otherwise the topic name as is.
//! Message key: account id (ensures ordering per account)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{BusError, Delivery, LogConsumer, LogPublisher, LogSubscriber, Result};
use crate::config::{ConfigError, KafkaConfig};

/// Timeout for producer delivery and consumer seeks.
const KAFKA_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaLogConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Optional prefix for every topic.
    pub topic_prefix: Option<String>,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl KafkaLogConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic_prefix: None,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Build from the `messaging.kafka` section.
    ///
    /// `bootstrap_servers` is required.
    pub fn from_config(config: &KafkaConfig) -> std::result::Result<Self, ConfigError> {
        let servers = config
            .bootstrap_servers
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingTarget("messaging.kafka.bootstrap_servers"))?;

        Ok(Self {
            bootstrap_servers: servers.to_string(),
            topic_prefix: config.topic_prefix.clone(),
            sasl_username: config.sasl_username.clone(),
            sasl_password: config.sasl_password.clone(),
            sasl_mechanism: config.sasl_mechanism.clone(),
            security_protocol: config.security_protocol.clone(),
            ssl_ca_location: config.ssl_ca_location.clone(),
        })
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    /// Set topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    /// Physical topic name for a logical topic.
    pub fn topic_name(&self, topic: &str) -> String {
        match &self.topic_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, topic),
            _ => topic.to_string(),
        }
    }

    /// Build a ClientConfig for producers.
    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        config.set("enable.idempotence", "true");

        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for consumers of one group.
    fn build_consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        self.apply_security_config(&mut config);
        config
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        let settings = [
            ("security.protocol", &self.security_protocol),
            ("sasl.mechanism", &self.sasl_mechanism),
            ("sasl.username", &self.sasl_username),
            ("sasl.password", &self.sasl_password),
            ("ssl.ca.location", &self.ssl_ca_location),
        ];
        for (name, value) in settings {
            if let Some(value) = value {
                config.set(name, value);
            }
        }
    }
}

/// Kafka-backed log: one shared producer, one consumer per subscription.
pub struct KafkaLog {
    producer: FutureProducer,
    config: KafkaLogConfig,
}

impl KafkaLog {
    pub fn new(config: KafkaLogConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic_prefix = ?config.topic_prefix,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }
}

#[async_trait]
impl LogPublisher for KafkaLog {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let topic = self.config.topic_name(topic);
        let record = FutureRecord::to(&topic).key(key).payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, KAFKA_TIMEOUT)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(topic = %topic, key, partition, offset, "Published record to Kafka");
        Ok(())
    }
}

#[async_trait]
impl LogSubscriber for KafkaLog {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn LogConsumer>> {
        let topic = self.config.topic_name(topic);
        let consumer: StreamConsumer = self
            .config
            .build_consumer_config(group)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topic: {}", e)))?;

        info!(topic = %topic, group, "Subscribed to Kafka topic");
        Ok(Box::new(KafkaConsumer {
            consumer: Arc::new(consumer),
        }))
    }
}

/// Pull consumer over a Kafka consumer group.
///
/// Offsets are committed only on ack. A nack seeks the partition back to
/// the record so it is fetched again; a skip leaves the in-session position
/// past it, so after a restart it is delivered again.
///
/// librdkafka calls that block run on the blocking pool, never on a runtime
/// worker.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl LogConsumer for KafkaConsumer {
    async fn fetch(&mut self) -> Result<Delivery> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;

        Ok(Delivery {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);
        let topic = delivery.topic.clone();
        let partition = delivery.partition;
        let next = Offset::Offset(delivery.offset + 1);

        tokio::task::spawn_blocking(move || {
            let mut offsets = TopicPartitionList::new();
            offsets.add_partition_offset(&topic, partition, next)?;
            consumer.commit(&offsets, CommitMode::Sync)
        })
        .await
        .map_err(|e| BusError::Commit(format!("Commit task failed: {}", e)))?
        .map_err(|e| BusError::Commit(e.to_string()))
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);
        let topic = delivery.topic.clone();
        let partition = delivery.partition;
        let offset = delivery.offset;

        tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), KAFKA_TIMEOUT)
        })
        .await
        .map_err(|e| BusError::Fetch(format!("Seek task failed: {}", e)))?
        .map_err(|e| BusError::Fetch(format!("Failed to seek back: {}", e)))
    }

    async fn skip(&mut self, _delivery: &Delivery) -> Result<()> {
        Ok(())
    }
}
