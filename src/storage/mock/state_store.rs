//! Mock StateStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::injected_failure;
use crate::model::{Fact, MaterializedState, Step};
use crate::storage::{Result, StateStore};

/// Mock state store that keeps balances in memory.
#[derive(Default)]
pub struct MockStateStore {
    states: Mutex<HashMap<String, MaterializedState>>,
    fail_on_apply: RwLock<bool>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_apply(&self, fail: bool) {
        *self.fail_on_apply.write().await = fail;
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn apply(&self, fact: &Fact) -> Result<Step> {
        if *self.fail_on_apply.read().await {
            return Err(injected_failure());
        }

        // Holding the map lock across decide-and-write is the per-account transaction.
        let mut states = self.states.lock().await;
        let step = states
            .get(&fact.account_id)
            .cloned()
            .unwrap_or_else(|| MaterializedState::empty(fact.account_id.clone()))
            .step(fact);

        if let Step::Advance { next, .. } = &step {
            states.insert(fact.account_id.clone(), next.clone());
        }
        Ok(step)
    }

    async fn get(&self, account_id: &str) -> Result<Option<MaterializedState>> {
        Ok(self.states.lock().await.get(account_id).cloned())
    }
}
