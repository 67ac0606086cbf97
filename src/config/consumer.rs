//! Topic names and consumer loop settings.

use std::time::Duration;

use serde::Deserialize;

/// Topic names for the three streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Commands awaiting sequencing, keyed by account.
    pub commands: String,
    /// Sequenced facts, keyed by account.
    pub facts: String,
    /// Balance-change broadcasts, keyed by account.
    pub balance_changes: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            commands: "account-commands".to_string(),
            facts: "account-facts".to_string(),
            balance_changes: "balance-changes".to_string(),
        }
    }
}

/// Consumer loop tuning and per-service group names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Pause after a processing failure or a fetch error.
    pub retry_delay_ms: u64,
    /// Pause after a deferred message (gap or sequence conflict).
    pub defer_delay_ms: u64,
    /// Consumer group of the sequencer.
    pub sequencer_group: String,
    /// Consumer group of the projector.
    pub projector_group: String,
    /// Consumer group of the notification sink.
    pub notifier_group: String,
    /// Consumer loops per service.
    pub workers: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            defer_delay_ms: 1000,
            sequencer_group: "ledger-sequencer".to_string(),
            projector_group: "ledger-projector".to_string(),
            notifier_group: "ledger-notifier".to_string(),
            workers: 1,
        }
    }
}

impl ConsumerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn defer_delay(&self) -> Duration {
        Duration::from_millis(self.defer_delay_ms)
    }
}
