//! PostgreSQL StateStore implementation.
//!
//! The state row is locked with `SELECT ... FOR UPDATE` for the duration of
//! the fold, so two projectors replaying the same fact serialize on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sqlx::{Acquire, PgConnection, PgPool, Row};
use tracing::debug;

use crate::model::{Fact, MaterializedState, Step};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::ProjectedState;
use crate::storage::{Result, StateStore};

/// Render the state lookup, optionally locking the row.
///
/// The builder is consumed here so no statement is held across an await.
fn select_state_sql(account_id: &str, for_update: bool) -> String {
    let mut query = Query::select();
    query
        .columns([
            ProjectedState::AccountId,
            ProjectedState::CurrentBalance,
            ProjectedState::LastProcessedSequence,
            ProjectedState::UpdatedAt,
        ])
        .from(ProjectedState::Table)
        .and_where(Expr::col(ProjectedState::AccountId).eq(account_id));
    if for_update {
        query.lock_exclusive();
    }
    query.to_string(PostgresQueryBuilder)
}

/// PostgreSQL implementation of StateStore.
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(
        conn: &mut PgConnection,
        account_id: &str,
        for_update: bool,
    ) -> Result<Option<MaterializedState>> {
        let query = select_state_sql(account_id, for_update);

        let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };

        Ok(Some(MaterializedState {
            account_id: row.get("account_id"),
            current_balance: row.get::<Decimal, _>("current_balance"),
            last_processed_sequence: row.get("last_processed_sequence"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }))
    }

    async fn save(conn: &mut PgConnection, state: &MaterializedState) -> Result<()> {
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
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn apply(&self, fact: &Fact) -> Result<Step> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // A missing row cannot be locked; SERIALIZABLE covers the first fold
        // of an account, where two writers would both see no state.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let state = Self::load(&mut tx, &fact.account_id, true)
            .await?
            .unwrap_or_else(|| MaterializedState::empty(fact.account_id.clone()));

        let step = state.step(fact);
        if let Step::Advance { next, .. } = &step {
            Self::save(&mut tx, next).await?;
        }

        tx.commit().await?;

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
        Self::load(&mut conn, account_id, false).await
    }
}
