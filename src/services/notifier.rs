//! Notification sink: records every balance change it receives.
//!
//! A read model only. Redelivered changes are recorded again.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::bus::{MessageHandler, Outcome};
use crate::model::BalanceChanged;
use crate::storage::NotificationStore;

pub struct Notifier {
    notifications: Arc<dyn NotificationStore>,
}

impl Notifier {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }

    pub async fn notify(&self, change: &BalanceChanged) -> Outcome {
        info!(
            account_id = %change.account_id,
            sequence_num = change.sequence_num,
            kind = %change.kind,
            amount = %change.amount,
            balance_before = %change.balance_before,
            balance_after = %change.balance_after,
            "Balance changed"
        );

        match self.notifications.record(change).await {
            Ok(_) => Outcome::Applied,
            Err(e) => Outcome::Failed(format!("failed to record notification: {}", e)),
        }
    }
}

#[async_trait]
impl MessageHandler for Notifier {
    type Message = BalanceChanged;

    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn process(&self, _key: &str, change: BalanceChanged) -> Outcome {
        self.notify(&change).await
    }
}
