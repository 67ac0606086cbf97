//! Storage layer: the fact log, materialized balances and the notification log.
//!
//! This module contains:
//! - `FactStore`: append-only, per-account sequenced fact log (sequencer-owned)
//! - `StateStore`: materialized balance per account (projector-owned)
//! - `NotificationStore`: balance-change log kept by the notification sink
//! - Implementations: SQLite, PostgreSQL, in-memory mocks

use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, StorageConfig, StorageType};

mod fact_store;
pub mod helpers;
pub mod mock;
mod notification_store;
pub mod schema;
mod state_store;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fact_store::FactStore;
pub use mock::{MockFactStore, MockNotificationStore, MockStateStore};
pub use notification_store::NotificationStore;
pub use state_store::StateStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresFactStore, PostgresNotificationStore, PostgresStateStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteFactStore, SqliteNotificationStore, SqliteStateStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Another writer committed the same `(account_id, sequence_num)` first.
    #[error("Sequence conflict: account={account_id}, sequence={sequence_num}")]
    SequenceConflict {
        account_id: String,
        sequence_num: i64,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid entry kind: {0}")]
    InvalidKind(#[from] crate::model::UnknownKind),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether the error is the expected outcome of a lost insert race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::SequenceConflict { .. })
    }
}

/// The three stores a deployment runs against.
#[derive(Clone)]
pub struct Stores {
    pub facts: Arc<dyn FactStore>,
    pub states: Arc<dyn StateStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// In-memory stores for tests and demos.
    pub fn mock() -> Self {
        Self {
            facts: Arc::new(MockFactStore::new()),
            states: Arc::new(MockStateStore::new()),
            notifications: Arc::new(MockNotificationStore::new()),
        }
    }
}

/// Errors raised while bringing storage up at startup.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to prepare storage path: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize storage based on configuration.
///
/// Connects (with retry), creates the schema if missing and returns the
/// backend's three stores sharing one pool.
pub async fn init_storage(config: &StorageConfig) -> std::result::Result<Stores, InitError> {
    match config.storage_type {
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let path = &config.sqlite.path;
                info!(storage_type = "sqlite", path = %path, "Initializing storage");

                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }

                let pool = sqlite::connect(&format!("sqlite:{}?mode=rwc", path)).await?;
                Ok(sqlite::stores(pool).await?)
            }

            #[cfg(not(feature = "sqlite"))]
            {
                Err(ConfigError::FeatureNotEnabled {
                    backend: "sqlite",
                    feature: "sqlite",
                }
                .into())
            }
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let uri = config
                    .postgres
                    .uri
                    .as_deref()
                    .ok_or(ConfigError::MissingTarget("storage.postgres.uri"))?;
                info!(storage_type = "postgres", "Initializing storage");

                let pool = postgres::connect(uri).await?;
                Ok(postgres::stores(pool).await?)
            }

            #[cfg(not(feature = "postgres"))]
            {
                Err(ConfigError::FeatureNotEnabled {
                    backend: "postgres",
                    feature: "postgres",
                }
                .into())
            }
        }
    }
}
