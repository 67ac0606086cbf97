//! NotificationStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{BalanceChanged, Notification};

/// Interface for the notification log kept by the notification sink.
///
/// A read model only: every received balance change is appended, including
/// redeliveries.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Append a received balance change.
    async fn record(&self, change: &BalanceChanged) -> Result<Notification>;

    /// Notifications for an account, most recently received first.
    async fn list(&self, account_id: &str) -> Result<Vec<Notification>>;
}
