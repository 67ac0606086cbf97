//! Ordered-log transport configuration types.

use serde::Deserialize;

/// Messaging type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process partitioned log (no external broker).
    #[default]
    Channel,
    /// Apache Kafka.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// In-process log configuration.
    pub channel: ChannelConfig,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

/// In-process log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Partitions per topic. Keys hash onto partitions.
    pub partitions: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { partitions: 4 }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated). Required when `type: kafka`.
    pub bootstrap_servers: Option<String>,
    /// Prefix prepended to every topic name, joined with `.`.
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
