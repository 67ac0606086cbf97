//! Consumer loop: fetch, decode, process, settle.
//!
//! One loop drives one `LogConsumer`. Each record is decoded as JSON into
//! the handler's message type and processed to completion before the next
//! fetch; the `Outcome` decides how the record is settled:
//!
//! | Outcome      | Settle | Log   | Then                 |
//! |--------------|--------|-------|----------------------|
//! | `Applied`    | ack    | -     | next record          |
//! | `Deferred`   | nack   | warn  | wait `defer_delay`   |
//! | `Failed`     | nack   | error | wait `retry_delay`   |
//! | undecodable  | skip   | error | next record          |
//!
//! A fetch error is logged and retried after `retry_delay`. Shutdown is
//! observed only while waiting for a record or sleeping, so a record that
//! is being processed is always settled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Delivery, LogConsumer};
use crate::config::ConsumerConfig;

/// Result of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fully handled; the record may be committed.
    Applied,
    /// Cannot be handled yet (a predecessor is missing or a concurrent
    /// writer won); redeliver after a pause.
    Deferred(String),
    /// Processing failed; redeliver after a pause.
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => f.write_str("applied"),
            Outcome::Deferred(reason) => write!(f, "deferred: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Processes messages of one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Wire type of the topic.
    type Message: DeserializeOwned + Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Process one message. `key` is the record key (the account id).
    async fn process(&self, key: &str, message: Self::Message) -> Outcome;
}

/// Pauses used by the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub retry_delay: Duration,
    pub defer_delay: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&ConsumerConfig::default())
    }
}

impl From<&ConsumerConfig> for LoopSettings {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            defer_delay: config.defer_delay(),
        }
    }
}

/// Handle to a running consumer loop.
pub struct ConsumerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal the loop to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Consumer task panicked");
        }
    }
}

/// Spawn a consumer loop with its own shutdown signal.
pub fn spawn_consumer<H: MessageHandler>(
    handler: Arc<H>,
    consumer: Box<dyn LogConsumer>,
    settings: LoopSettings,
) -> ConsumerHandle {
    let (cancel, shutdown) = watch::channel(false);
    let task = tokio::spawn(run_consumer(handler, consumer, settings, shutdown));
    ConsumerHandle { cancel, task }
}

/// Run a consumer loop until `shutdown` turns true or its sender is dropped.
pub async fn run_consumer<H: MessageHandler>(
    handler: Arc<H>,
    mut consumer: Box<dyn LogConsumer>,
    settings: LoopSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = handler.name();
    info!(handler = name, "Consumer loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            result = consumer.fetch() => result,
        };

        let delivery = match fetched {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(handler = name, error = %e, "Fetch failed");
                if pause(settings.retry_delay, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        let message: H::Message = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    handler = name,
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.key,
                    error = %e,
                    "Undecodable message, skipping"
                );
                settle(name, consumer.skip(&delivery).await, &delivery);
                continue;
            }
        };

        let delay = match handler.process(&delivery.key, message).await {
            Outcome::Applied => {
                debug!(
                    handler = name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Message applied"
                );
                settle(name, consumer.ack(&delivery).await, &delivery);
                None
            }
            Outcome::Deferred(reason) => {
                warn!(
                    handler = name,
                    key = %delivery.key,
                    offset = delivery.offset,
                    reason = %reason,
                    "Message deferred, will redeliver"
                );
                settle(name, consumer.nack(&delivery).await, &delivery);
                Some(settings.defer_delay)
            }
            Outcome::Failed(reason) => {
                error!(
                    handler = name,
                    key = %delivery.key,
                    offset = delivery.offset,
                    reason = %reason,
                    "Message processing failed, will redeliver"
                );
                settle(name, consumer.nack(&delivery).await, &delivery);
                Some(settings.retry_delay)
            }
        };

        if let Some(delay) = delay {
            if pause(delay, &mut shutdown).await {
                break;
            }
        }
    }

    info!(handler = name, "Consumer loop stopped");
}

fn settle(name: &str, result: super::Result<()>, delivery: &Delivery) {
    if let Err(e) = result {
        error!(
            handler = name,
            partition = delivery.partition,
            offset = delivery.offset,
            error = %e,
            "Failed to settle message"
        );
    }
}

/// Sleep for `delay`. Returns true if shutdown was requested meanwhile.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if delay.is_zero() {
        return *shutdown.borrow();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
