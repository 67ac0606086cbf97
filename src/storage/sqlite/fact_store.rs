//! SQLite FactStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::rollback;
use crate::model::{Command, Fact};
use crate::storage::helpers::{
    classify_fact_write, format_timestamp, parse_amount, parse_kind, parse_timestamp, parse_uuid,
};
use crate::storage::schema::EventStore;
use crate::storage::{FactStore, Result};

/// SQLite implementation of FactStore.
pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    /// Create a new SQLite fact store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn read_max_sequence(conn: &mut SqliteConnection, account_id: &str) -> Result<i64> {
        let query = Query::select()
            .expr(Expr::col(EventStore::SequenceNum).max())
            .from(EventStore::Table)
            .and_where(Expr::col(EventStore::AccountId).eq(account_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;

        Ok(row
            .and_then(|row| row.get::<Option<i64>, _>(0))
            .unwrap_or(0))
    }

    /// Insert one fact within an already-started transaction.
    pub(crate) async fn insert_fact(conn: &mut SqliteConnection, fact: &Fact) -> Result<()> {
        let query = Query::insert()
            .into_table(EventStore::Table)
            .columns([
                EventStore::Id,
                EventStore::AccountId,
                EventStore::SequenceNum,
                EventStore::EventType,
                EventStore::Amount,
                EventStore::Description,
                EventStore::CorrelationId,
                EventStore::CreatedAt,
            ])
            .values_panic([
                fact.fact_id.to_string().into(),
                fact.account_id.clone().into(),
                fact.sequence_num.into(),
                fact.kind.as_str().into(),
                fact.signed_amount.to_string().into(),
                fact.description.clone().into(),
                fact.correlation_id.to_string().into(),
                format_timestamp(&fact.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify_fact_write(e, &fact.account_id, fact.sequence_num))?;

        Ok(())
    }

    async fn assign_next(conn: &mut SqliteConnection, command: &Command) -> Result<Fact> {
        let max = Self::read_max_sequence(conn, &command.account_id).await?;
        let fact = Fact::assign(command, max + 1);
        Self::insert_fact(conn, &fact).await?;
        Ok(fact)
    }
}

fn fact_from_row(row: &SqliteRow) -> Result<Fact> {
    let id: String = row.get("id");
    let kind: String = row.get("event_type");
    let amount: String = row.get("amount");
    let correlation_id: String = row.get("correlation_id");
    let created_at: String = row.get("created_at");

    Ok(Fact {
        fact_id: parse_uuid(&id)?,
        account_id: row.get("account_id"),
        sequence_num: row.get("sequence_num"),
        kind: parse_kind(&kind)?,
        signed_amount: parse_amount(&amount)?,
        description: row.get("description"),
        correlation_id: parse_uuid(&correlation_id)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn append(&self, command: &Command) -> Result<Fact> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let fact = match Self::assign_next(&mut conn, command).await {
            Ok(fact) => fact,
            Err(e) => {
                rollback(&mut conn).await;
                return Err(e);
            }
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            rollback(&mut conn).await;
            return Err(classify_fact_write(e, &fact.account_id, fact.sequence_num));
        }

        debug!(
            account_id = %fact.account_id,
            sequence_num = fact.sequence_num,
            "Fact committed"
        );
        Ok(fact)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<Fact>> {
        let query = Query::select()
            .columns([
                EventStore::Id,
                EventStore::AccountId,
                EventStore::SequenceNum,
                EventStore::EventType,
                EventStore::Amount,
                EventStore::Description,
                EventStore::CorrelationId,
                EventStore::CreatedAt,
            ])
            .from(EventStore::Table)
            .and_where(Expr::col(EventStore::AccountId).eq(account_id))
            .order_by(EventStore::SequenceNum, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(fact_from_row).collect()
    }

    async fn max_sequence(&self, account_id: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::read_max_sequence(&mut conn, account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use crate::test_utils::{credit, fact_at};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteFactStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::storage::sqlite::init_schema(&pool).await.unwrap();
        SqliteFactStore::new(pool)
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_a_conflict() {
        let store = store().await;
        let mut conn = store.pool.acquire().await.unwrap();

        SqliteFactStore::insert_fact(&mut conn, &fact_at("A1", 1, 10))
            .await
            .unwrap();
        let err = SqliteFactStore::insert_fact(&mut conn, &fact_at("A1", 1, 20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::SequenceConflict { ref account_id, sequence_num: 1 } if account_id == "A1"
        ));
    }

    #[tokio::test]
    async fn test_append_after_foreign_insert_continues_sequence() {
        let store = store().await;
        {
            let mut conn = store.pool.acquire().await.unwrap();
            SqliteFactStore::insert_fact(&mut conn, &fact_at("A1", 1, 10))
                .await
                .unwrap();
        }

        let fact = store.append(&credit("A1", 5)).await.unwrap();
        assert_eq!(fact.sequence_num, 2);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_open_transaction() {
        let store = store().await;
        {
            let mut conn = store.pool.acquire().await.unwrap();
            sqlx::query("DROP TABLE event_store")
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        assert!(store.append(&credit("A1", 5)).await.is_err());

        // A second BEGIN would fail if the first transaction were left open.
        crate::storage::sqlite::init_schema(&store.pool).await.unwrap();
        assert_eq!(store.append(&credit("A1", 5)).await.unwrap().sequence_num, 1);
    }
}
