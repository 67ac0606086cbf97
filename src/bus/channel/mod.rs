//! In-process partitioned log for standalone mode.
//!
//! Behaves like a small Kafka inside one process:
//! - each topic has a fixed number of partitions, records are routed by key
//! - each consumer group keeps a committed offset and a fetch position per
//!   partition
//! - a partition with a record in flight is not handed to any other
//!   consumer of the same group until that record is settled
//!
//! Records are kept for the life of the log. Ideal for local development
//! and testing without external dependencies.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{BusError, Delivery, LogConsumer, LogPublisher, LogSubscriber, Result};

/// Partition count used when none is configured.
pub const DEFAULT_PARTITIONS: usize = 4;

struct Record {
    key: String,
    payload: Vec<u8>,
}

/// Per-partition progress of one consumer group.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    committed: usize,
    position: usize,
    in_flight: bool,
}

struct Topic {
    partitions: Vec<Vec<Record>>,
    groups: HashMap<String, Vec<Cursor>>,
}

impl Topic {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
            groups: HashMap::new(),
        }
    }

    fn cursors(&mut self, group: &str) -> &mut Vec<Cursor> {
        let count = self.partitions.len();
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| vec![Cursor::default(); count])
    }
}

#[derive(Default)]
struct LogState {
    topics: HashMap<String, Topic>,
}

struct Shared {
    partitions: usize,
    state: Mutex<LogState>,
    /// Woken on every append and every settle.
    changed: Notify,
}

/// In-memory partitioned log shared by every publisher and consumer of a
/// process. Clones are handles to the same log.
#[derive(Clone)]
pub struct InMemoryLog {
    shared: Arc<Shared>,
}

impl InMemoryLog {
    /// Create a log whose topics have `partitions` partitions (at least one).
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        info!(partitions, "Channel log initialized");
        Self {
            shared: Arc::new(Shared {
                partitions,
                state: Mutex::new(LogState::default()),
                changed: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // No operation leaves the state half-updated, so a poisoned lock is still consistent.
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Partition a key is routed to.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shared.partitions as u64) as usize
    }

    /// Records appended to `topic` across all partitions.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|t| t.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Records of `topic` not yet committed by `group`.
    pub fn pending(&self, topic: &str, group: &str) -> usize {
        let mut state = self.lock();
        let Some(topic) = state.topics.get_mut(topic) else {
            return 0;
        };
        let lens: Vec<usize> = topic.partitions.iter().map(Vec::len).collect();
        topic
            .cursors(group)
            .iter()
            .zip(lens)
            .map(|(cursor, len)| len - cursor.committed)
            .sum()
    }

    /// Keys and payloads of `topic`, partition by partition in append order.
    pub fn records(&self, topic: &str) -> Vec<(String, Vec<u8>)> {
        self.lock()
            .topics
            .get(topic)
            .map(|t| {
                t.partitions
                    .iter()
                    .flatten()
                    .map(|r| (r.key.clone(), r.payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reset every fetch position of `group` on `topic` to its committed
    /// offset, as a restarted consumer would resume.
    pub fn rewind_group(&self, topic: &str, group: &str) {
        {
            let mut state = self.lock();
            if let Some(topic) = state.topics.get_mut(topic) {
                for cursor in topic.cursors(group) {
                    cursor.position = cursor.committed;
                }
            }
        }
        self.shared.changed.notify_waiters();
    }

    /// Open a consumer for `group` on `topic`.
    pub fn consumer(&self, topic: &str, group: &str) -> ChannelConsumer {
        {
            let mut state = self.lock();
            let partitions = self.shared.partitions;
            state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| Topic::new(partitions))
                .cursors(group);
        }
        ChannelConsumer {
            log: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            next_partition: 0,
            claimed: HashSet::new(),
        }
    }

    fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> (usize, usize) {
        let partition = self.partition_for(key);
        let mut state = self.lock();
        let partitions = self.shared.partitions;
        let log = &mut state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(partitions))
            .partitions[partition];
        log.push(Record {
            key: key.to_string(),
            payload,
        });
        (partition, log.len() - 1)
    }

    /// Claim the next available record for `group`, starting the scan at
    /// partition `start`.
    fn claim(&self, topic: &str, group: &str, start: usize) -> Option<Delivery> {
        let mut state = self.lock();
        let topic_state = state.topics.get_mut(topic)?;
        let lens: Vec<usize> = topic_state.partitions.iter().map(Vec::len).collect();
        let count = lens.len();
        let cursors = topic_state.cursors(group);

        let partition = (0..count)
            .map(|i| (start + i) % count)
            .find(|&p| !cursors[p].in_flight && cursors[p].position < lens[p])?;

        let cursor = &mut cursors[partition];
        cursor.in_flight = true;
        let offset = cursor.position;

        let record = &topic_state.partitions[partition][offset];
        Some(Delivery {
            topic: topic.to_string(),
            partition: partition as i32,
            offset: offset as i64,
            key: record.key.clone(),
            payload: record.payload.clone(),
        })
    }

    /// Settle an in-flight record: move the fetch position to `position`
    /// and optionally commit it.
    fn settle(&self, topic: &str, group: &str, partition: usize, position: usize, commit: bool) {
        {
            let mut state = self.lock();
            if let Some(topic) = state.topics.get_mut(topic) {
                if let Some(cursor) = topic.cursors(group).get_mut(partition) {
                    cursor.in_flight = false;
                    cursor.position = position;
                    if commit {
                        cursor.committed = cursor.committed.max(position);
                    }
                }
            }
        }
        self.shared.changed.notify_waiters();
    }

    fn release(&self, topic: &str, group: &str, partitions: &HashSet<usize>) {
        {
            let mut state = self.lock();
            if let Some(topic) = state.topics.get_mut(topic) {
                let cursors = topic.cursors(group);
                for &p in partitions {
                    if let Some(cursor) = cursors.get_mut(p) {
                        cursor.in_flight = false;
                    }
                }
            }
        }
        self.shared.changed.notify_waiters();
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

#[async_trait]
impl LogPublisher for InMemoryLog {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let (partition, offset) = self.append(topic, key, payload);
        debug!(topic, key, partition, offset, "Appended record to channel log");
        self.shared.changed.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl LogSubscriber for InMemoryLog {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn LogConsumer>> {
        Ok(Box::new(self.consumer(topic, group)))
    }
}

/// Consumer of one topic for one group.
///
/// Dropping the consumer releases the records it holds in flight; they are
/// delivered again to the next consumer of the group.
pub struct ChannelConsumer {
    log: InMemoryLog,
    topic: String,
    group: String,
    next_partition: usize,
    claimed: HashSet<usize>,
}

impl ChannelConsumer {
    fn settle(&mut self, delivery: &Delivery, position: usize, commit: bool) -> Result<()> {
        let partition = usize::try_from(delivery.partition)
            .map_err(|_| BusError::Commit(format!("invalid partition {}", delivery.partition)))?;
        if !self.claimed.remove(&partition) {
            return Err(BusError::Commit(format!(
                "record {}/{} is not held by this consumer",
                delivery.partition, delivery.offset
            )));
        }
        self.log
            .settle(&self.topic, &self.group, partition, position, commit);
        Ok(())
    }

    fn offset(delivery: &Delivery) -> Result<usize> {
        usize::try_from(delivery.offset)
            .map_err(|_| BusError::Commit(format!("invalid offset {}", delivery.offset)))
    }
}

#[async_trait]
impl LogConsumer for ChannelConsumer {
    async fn fetch(&mut self) -> Result<Delivery> {
        loop {
            // Registered before the check so an append in between is not missed.
            let changed = self.log.shared.changed.notified();

            if let Some(delivery) = self.log.claim(&self.topic, &self.group, self.next_partition) {
                let partition = delivery.partition as usize;
                self.claimed.insert(partition);
                self.next_partition = partition + 1;
                return Ok(delivery);
            }

            changed.await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let next = Self::offset(delivery)? + 1;
        self.settle(delivery, next, true)
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<()> {
        let same = Self::offset(delivery)?;
        self.settle(delivery, same, false)
    }

    async fn skip(&mut self, delivery: &Delivery) -> Result<()> {
        let next = Self::offset(delivery)? + 1;
        self.settle(delivery, next, false)
    }
}

impl Drop for ChannelConsumer {
    fn drop(&mut self) {
        if !self.claimed.is_empty() {
            self.log.release(&self.topic, &self.group, &self.claimed);
        }
    }
}
