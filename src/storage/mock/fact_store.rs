//! Mock FactStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::injected_failure;
use crate::model::{Command, Fact};
use crate::storage::{FactStore, Result, StorageError};

/// Mock fact store that keeps per-account logs in memory.
///
/// `append` reads the maximum and inserts under separate lock acquisitions
/// with a yield in between, so concurrent appends for one account can race
/// exactly like two database transactions. The loser gets
/// `SequenceConflict`.
#[derive(Default)]
pub struct MockFactStore {
    facts: RwLock<HashMap<String, Vec<Fact>>>,
    fail_on_append: RwLock<bool>,
}

impl MockFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Total facts across all accounts.
    pub async fn stored_count(&self) -> usize {
        self.facts.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl FactStore for MockFactStore {
    async fn append(&self, command: &Command) -> Result<Fact> {
        if *self.fail_on_append.read().await {
            return Err(injected_failure());
        }

        let max = self.max_sequence(&command.account_id).await?;
        let fact = Fact::assign(command, max + 1);

        tokio::task::yield_now().await;

        let mut facts = self.facts.write().await;
        let log = facts.entry(command.account_id.clone()).or_default();
        if log.len() as i64 != max {
            return Err(StorageError::SequenceConflict {
                account_id: fact.account_id,
                sequence_num: fact.sequence_num,
            });
        }
        log.push(fact.clone());
        Ok(fact)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<Fact>> {
        Ok(self
            .facts
            .read()
            .await
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn max_sequence(&self, account_id: &str) -> Result<i64> {
        Ok(self
            .facts
            .read()
            .await
            .get(account_id)
            .map(|log| log.len() as i64)
            .unwrap_or(0))
    }
}
