//! Mock transport implementations for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};

use super::{BusError, Delivery, LogConsumer, LogPublisher, Result};

/// One record captured by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    /// Decode the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Mock publisher for testing.
#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<PublishedRecord>>,
    fail_on_publish: RwLock<bool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<PublishedRecord> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl LogPublisher for MockPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}

/// How a delivery was settled by the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack(i64),
    Nack(i64),
    Skip(i64),
}

/// Scripted consumer for testing.
///
/// Hands out queued deliveries in order; a nacked delivery goes back to the
/// front of the queue. When the queue is empty `fetch` waits forever (or
/// fails, if told to). Settlements are recorded in a shared log that stays
/// readable after the consumer has been moved into a loop.
#[derive(Default)]
pub struct MockConsumer {
    queue: VecDeque<Delivery>,
    settlements: Arc<Mutex<Vec<Settlement>>>,
    fetch_failures: usize,
}

impl MockConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw payload under `key` on partition 0.
    pub fn push(&mut self, key: &str, payload: impl Into<Vec<u8>>) -> &mut Self {
        let offset = self.queue.len() as i64;
        self.queue.push_back(Delivery {
            topic: "mock".to_string(),
            partition: 0,
            offset,
            key: key.to_string(),
            payload: payload.into(),
        });
        self
    }

    /// Queue `value` as JSON under `key`.
    pub fn push_json<T: serde::Serialize>(&mut self, key: &str, value: &T) -> &mut Self {
        let payload = serde_json::to_vec(value).unwrap_or_default();
        self.push(key, payload)
    }

    /// Make the next `count` fetches fail before any delivery is handed out.
    pub fn fail_fetches(&mut self, count: usize) -> &mut Self {
        self.fetch_failures = count;
        self
    }

    /// Handle to the settlement log.
    pub fn settlements(&self) -> Arc<Mutex<Vec<Settlement>>> {
        Arc::clone(&self.settlements)
    }
}

#[async_trait]
impl LogConsumer for MockConsumer {
    async fn fetch(&mut self) -> Result<Delivery> {
        if self.fetch_failures > 0 {
            self.fetch_failures -= 1;
            return Err(BusError::Fetch("Mock fetch failure".to_string()));
        }
        match self.queue.pop_front() {
            Some(delivery) => Ok(delivery),
            None => std::future::pending().await,
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.settlements
            .lock()
            .await
            .push(Settlement::Ack(delivery.offset));
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<()> {
        self.settlements
            .lock()
            .await
            .push(Settlement::Nack(delivery.offset));
        self.queue.push_front(delivery.clone());
        Ok(())
    }

    async fn skip(&mut self, delivery: &Delivery) -> Result<()> {
        self.settlements
            .lock()
            .await
            .push(Settlement::Skip(delivery.offset));
        Ok(())
    }
}
