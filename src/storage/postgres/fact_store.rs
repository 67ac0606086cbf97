//! PostgreSQL FactStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{Acquire, PgConnection, PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Command, Fact};
use crate::storage::helpers::{classify_fact_write, format_timestamp, parse_kind};
use crate::storage::schema::EventStore;
use crate::storage::{FactStore, Result};

/// PostgreSQL implementation of FactStore.
pub struct PostgresFactStore {
    pool: PgPool,
}

impl PostgresFactStore {
    /// Create a new PostgreSQL fact store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn read_max_sequence(conn: &mut PgConnection, account_id: &str) -> Result<i64> {
        let query = Query::select()
            .expr(Expr::col(EventStore::SequenceNum).max())
            .from(EventStore::Table)
            .and_where(Expr::col(EventStore::AccountId).eq(account_id))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;

        Ok(row
            .and_then(|row| row.get::<Option<i64>, _>(0))
            .unwrap_or(0))
    }

    async fn insert_fact(conn: &mut PgConnection, fact: &Fact) -> Result<()> {
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
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify_fact_write(e, &fact.account_id, fact.sequence_num))?;

        Ok(())
    }
}

fn fact_from_row(row: &PgRow) -> Result<Fact> {
    let kind: String = row.get("event_type");

    Ok(Fact {
        fact_id: row.get::<Uuid, _>("id"),
        account_id: row.get("account_id"),
        sequence_num: row.get("sequence_num"),
        kind: parse_kind(&kind)?,
        signed_amount: row.get::<Decimal, _>("amount"),
        description: row.get("description"),
        correlation_id: row.get::<Uuid, _>("correlation_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[async_trait]
impl FactStore for PostgresFactStore {
    async fn append(&self, command: &Command) -> Result<Fact> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let max = Self::read_max_sequence(&mut tx, &command.account_id).await?;
        let fact = Fact::assign(command, max + 1);

        // Dropping the transaction on error rolls it back.
        Self::insert_fact(&mut tx, &fact).await?;

        tx.commit().await.map_err(|e| {
            let err = classify_fact_write(e, &fact.account_id, fact.sequence_num);
            if err.is_conflict() {
                warn!(
                    account_id = %fact.account_id,
                    sequence_num = fact.sequence_num,
                    "Serialization failure on commit"
                );
            }
            err
        })?;

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
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(fact_from_row).collect()
    }

    async fn max_sequence(&self, account_id: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::read_max_sequence(&mut conn, account_id).await
    }
}
