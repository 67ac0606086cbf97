//! Mock NotificationStore implementation for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::injected_failure;
use crate::model::{BalanceChanged, Notification};
use crate::storage::{NotificationStore, Result};

/// Mock notification store backed by a vector in arrival order.
#[derive(Default)]
pub struct MockNotificationStore {
    notifications: RwLock<Vec<Notification>>,
    fail_on_record: RwLock<bool>,
}

impl MockNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_record(&self, fail: bool) {
        *self.fail_on_record.write().await = fail;
    }

    pub async fn recorded_count(&self) -> usize {
        self.notifications.read().await.len()
    }
}

#[async_trait]
impl NotificationStore for MockNotificationStore {
    async fn record(&self, change: &BalanceChanged) -> Result<Notification> {
        if *self.fail_on_record.read().await {
            return Err(injected_failure());
        }
        let notification = Notification::received(change);
        self.notifications.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<Notification>> {
        // Arrival order is receive order; newest first.
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .rev()
            .filter(|n| n.account_id == account_id)
            .cloned()
            .collect())
    }
}
