//! SQLite StateStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::rollback;
use crate::model::{Fact, MaterializedState, Step};
use crate::storage::helpers::{format_timestamp, parse_amount, parse_timestamp};
use crate::storage::schema::ProjectedState;
use crate::storage::{Result, StateStore};

/// SQLite implementation of StateStore.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Create a new SQLite state store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(conn: &mut SqliteConnection, account_id: &str) -> Result<Option<MaterializedState>> {
        let query = Query::select()
            .columns([
                ProjectedState::AccountId,
                ProjectedState::CurrentBalance,
                ProjectedState::LastProcessedSequence,
                ProjectedState::UpdatedAt,
            ])
            .from(ProjectedState::Table)
            .and_where(Expr::col(ProjectedState::AccountId).eq(account_id))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };

        let balance: String = row.get("current_balance");
        let updated_at: String = row.get("updated_at");
        Ok(Some(MaterializedState {
            account_id: row.get("account_id"),
            current_balance: parse_amount(&balance)?,
            last_processed_sequence: row.get("last_processed_sequence"),
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    async fn save(conn: &mut SqliteConnection, state: &MaterializedState) -> Result<()> {
        let query = Query::insert()
            .into_table(ProjectedState::Table)
            .columns([
                ProjectedState::AccountId,
                ProjectedState::CurrentBalance,
                ProjectedState::LastProcessedSequence,
                ProjectedState::UpdatedAt,
            ])
            .values_panic([
                state.account_id.clone().into(),
                state.current_balance.to_string().into(),
                state.last_processed_sequence.into(),
                format_timestamp(&state.updated_at).into(),
            ])
            .on_conflict(
                OnConflict::column(ProjectedState::AccountId)
                    .update_columns([
                        ProjectedState::CurrentBalance,
                        ProjectedState::LastProcessedSequence,
                        ProjectedState::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn fold(conn: &mut SqliteConnection, fact: &Fact) -> Result<Step> {
        let state = Self::load(conn, &fact.account_id)
            .await?
            .unwrap_or_else(|| MaterializedState::empty(fact.account_id.clone()));

        let step = state.step(fact);
        if let Step::Advance { next, .. } = &step {
            Self::save(conn, next).await?;
        }
        Ok(step)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn apply(&self, fact: &Fact) -> Result<Step> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let step = match Self::fold(&mut conn, fact).await {
            Ok(step) => step,
            Err(e) => {
                rollback(&mut conn).await;
                return Err(e);
            }
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            rollback(&mut conn).await;
            return Err(e.into());
        }

        debug!(
            account_id = %fact.account_id,
            sequence_num = fact.sequence_num,
            step = ?step,
            "Fact folded"
        );
        Ok(step)
    }

    async fn get(&self, account_id: &str) -> Result<Option<MaterializedState>> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut conn, account_id).await
    }
}
