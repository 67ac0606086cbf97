//! PostgreSQL implementations of storage interfaces.
//!
//! Fact appends run SERIALIZABLE so that two sequencers reading the same
//! maximum cannot both commit; the loser surfaces as `SequenceConflict`.

mod fact_store;
mod notification_store;
mod state_store;

use std::sync::Arc;

use backon::Retryable;
use sqlx::PgPool;
use tracing::{info, warn};

pub use fact_store::PostgresFactStore;
pub use notification_store::PostgresNotificationStore;
pub use state_store::PostgresStateStore;

use super::schema::POSTGRES_SCHEMA;
use super::{Result, Stores};
use crate::utils::retry::connection_backoff;

/// Connect to PostgreSQL with exponential backoff.
pub async fn connect(uri: &str) -> Result<PgPool> {
    let pool = (|| async { PgPool::connect(uri).await })
        .retry(connection_backoff())
        .notify(|e: &sqlx::Error, delay| {
            warn!(error = %e, ?delay, "PostgreSQL connection failed, retrying");
        })
        .await?;
    Ok(pool)
}

/// Create the ledger tables if missing.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(POSTGRES_SCHEMA).execute(pool).await?;
    info!("Ledger schema initialized (PostgreSQL)");
    Ok(())
}

/// Initialize the schema and build all three stores over one pool.
pub async fn stores(pool: PgPool) -> Result<Stores> {
    init_schema(&pool).await?;
    Ok(Stores {
        facts: Arc::new(PostgresFactStore::new(pool.clone())),
        states: Arc::new(PostgresStateStore::new(pool.clone())),
        notifications: Arc::new(PostgresNotificationStore::new(pool)),
    })
}
