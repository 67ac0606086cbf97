//! SQLite NotificationStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::model::{BalanceChanged, Notification};
use crate::storage::helpers::{
    format_timestamp, parse_amount, parse_kind, parse_timestamp, parse_uuid,
};
use crate::storage::schema::BalanceEventsLog;
use crate::storage::{NotificationStore, Result};

/// SQLite implementation of NotificationStore.
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    let text = |column: &str| -> String { row.get(column) };

    Ok(Notification {
        id: parse_uuid(&text("id"))?,
        account_id: text("account_id"),
        fact_id: parse_uuid(&text("fact_id"))?,
        sequence_num: row.get("sequence_num"),
        kind: parse_kind(&text("event_type"))?,
        amount: parse_amount(&text("amount"))?,
        balance_before: parse_amount(&text("balance_before"))?,
        balance_after: parse_amount(&text("balance_after"))?,
        correlation_id: parse_uuid(&text("correlation_id"))?,
        received_at: parse_timestamp(&text("received_at"))?,
    })
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }
}
