//! PostgreSQL NotificationStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::model::{BalanceChanged, Notification};
use crate::storage::helpers::{format_timestamp, parse_kind};
use crate::storage::schema::BalanceEventsLog;
use crate::storage::{NotificationStore, Result};

/// PostgreSQL implementation of NotificationStore.
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.get("event_type");

    Ok(Notification {
        id: row.get::<Uuid, _>("id"),
        account_id: row.get("account_id"),
        fact_id: row.get::<Uuid, _>("fact_id"),
        sequence_num: row.get("sequence_num"),
        kind: parse_kind(&kind)?,
        amount: row.get::<Decimal, _>("amount"),
        balance_before: row.get::<Decimal, _>("balance_before"),
        balance_after: row.get::<Decimal, _>("balance_after"),
        correlation_id: row.get::<Uuid, _>("correlation_id"),
        received_at: row.get::<DateTime<Utc>, _>("received_at"),
    })
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn record(&self, change: &BalanceChanged) -> Result<Notification> {
        let notification = Notification::received(change);

        let query = Query::insert()
            .into_table(BalanceEventsLog::Table)
            .columns([
                BalanceEventsLog::Id,
                BalanceEventsLog::AccountId,
                BalanceEventsLog::FactId,
                BalanceEventsLog::SequenceNum,
                BalanceEventsLog::EventType,
                BalanceEventsLog::Amount,
                BalanceEventsLog::BalanceBefore,
                BalanceEventsLog::BalanceAfter,
                BalanceEventsLog::CorrelationId,
                BalanceEventsLog::ReceivedAt,
            ])
            .values_panic([
                notification.id.to_string().into(),
                notification.account_id.clone().into(),
                notification.fact_id.to_string().into(),
                notification.sequence_num.into(),
                notification.kind.as_str().into(),
                notification.amount.to_string().into(),
                notification.balance_before.to_string().into(),
                notification.balance_after.to_string().into(),
                notification.correlation_id.to_string().into(),
                format_timestamp(&notification.received_at).into(),
            ])
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(notification)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<Notification>> {
        let query = Query::select()
            .columns([
                BalanceEventsLog::Id,
                BalanceEventsLog::AccountId,
                BalanceEventsLog::FactId,
                BalanceEventsLog::SequenceNum,
                BalanceEventsLog::EventType,
                BalanceEventsLog::Amount,
                BalanceEventsLog::BalanceBefore,
                BalanceEventsLog::BalanceAfter,
                BalanceEventsLog::CorrelationId,
                BalanceEventsLog::ReceivedAt,
            ])
            .from(BalanceEventsLog::Table)
            .and_where(Expr::col(BalanceEventsLog::AccountId).eq(account_id))
            .order_by(BalanceEventsLog::ReceivedAt, Order::Desc)
            .order_by(BalanceEventsLog::SequenceNum, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }
}
