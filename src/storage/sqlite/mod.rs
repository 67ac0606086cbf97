//! SQLite implementations of storage interfaces.
//!
//! Write transactions use `BEGIN IMMEDIATE`, which takes the database write
//! lock up front. Two writers never interleave their read and insert, and
//! the unique index on `(account_id, sequence_num)` still backs that up.

mod fact_store;
mod notification_store;
mod state_store;

use std::sync::Arc;

use backon::Retryable;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub use fact_store::SqliteFactStore;
pub use notification_store::SqliteNotificationStore;
pub use state_store::SqliteStateStore;

use super::schema::SQLITE_SCHEMA;
use super::{Result, Stores};
use crate::utils::retry::connection_backoff;

/// Connect to SQLite with exponential backoff.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let pool = (|| async { SqlitePool::connect(url).await })
        .retry(connection_backoff())
        .notify(|e: &sqlx::Error, delay| {
            warn!(error = %e, ?delay, "SQLite connection failed, retrying");
        })
        .await?;
    Ok(pool)
}

/// Create the ledger tables if missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SQLITE_SCHEMA).execute(pool).await?;
    info!("Ledger schema initialized (SQLite)");
    Ok(())
}

/// Initialize the schema and build all three stores over one pool.
pub async fn stores(pool: SqlitePool) -> Result<Stores> {
    init_schema(&pool).await?;
    Ok(Stores {
        facts: Arc::new(SqliteFactStore::new(pool.clone())),
        states: Arc::new(SqliteStateStore::new(pool.clone())),
        notifications: Arc::new(SqliteNotificationStore::new(pool)),
    })
}

/// Roll back an open transaction, ignoring failures.
///
/// Used on error paths where the original error is the one worth reporting.
async fn rollback(conn: &mut sqlx::SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(conn).await {
        warn!(error = %e, "Rollback failed");
    }
}
