//! Mock storage implementations for testing.

mod fact_store;
mod notification_store;
mod state_store;


pub use fact_store::MockFactStore;
pub use notification_store::MockNotificationStore;
pub use state_store::MockStateStore;

use super::StorageError;

/// Error returned by a mock told to fail.
fn injected_failure() -> StorageError {
    StorageError::Database(sqlx::Error::PoolClosed)
}
