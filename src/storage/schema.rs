//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Fact log table schema.
#[derive(Iden)]
pub enum EventStore {
    #[iden = "event_store"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "sequence_num"]
    SequenceNum,
    #[iden = "event_type"]
    EventType,
    #[iden = "amount"]
    Amount,
    #[iden = "description"]
    Description,
    #[iden = "correlation_id"]
    CorrelationId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Materialized balance table schema.
#[derive(Iden)]
pub enum ProjectedState {
    #[iden = "projected_state"]
    Table,
    #[iden = "account_id"]
    AccountId,
    #[iden = "current_balance"]
    CurrentBalance,
    #[iden = "last_processed_sequence"]
    LastProcessedSequence,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Notification log table schema.
#[derive(Iden)]
pub enum BalanceEventsLog {
    #[iden = "balance_events_log"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "fact_id"]
    FactId,
    #[iden = "sequence_num"]
    SequenceNum,
    #[iden = "event_type"]
    EventType,
    #[iden = "amount"]
    Amount,
    #[iden = "balance_before"]
    BalanceBefore,
    #[iden = "balance_after"]
    BalanceAfter,
    #[iden = "correlation_id"]
    CorrelationId,
    #[iden = "received_at"]
    ReceivedAt,
}

/// SQLite schema. Amounts are TEXT-encoded decimals.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS event_store (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    sequence_num INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT,
    correlation_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ix_event_store_account_id_sequence_num
    ON event_store(account_id, sequence_num);

CREATE TABLE IF NOT EXISTS projected_state (
    account_id TEXT PRIMARY KEY,
    current_balance TEXT NOT NULL,
    last_processed_sequence INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS balance_events_log (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    fact_id TEXT NOT NULL,
    sequence_num INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    balance_before TEXT NOT NULL,
    balance_after TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_balance_events_log_account_id_received_at
    ON balance_events_log(account_id, received_at DESC);
"#;

/// PostgreSQL schema. Amounts are NUMERIC(18,2), times are TIMESTAMPTZ.
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS event_store (
    id UUID PRIMARY KEY,
    account_id VARCHAR(50) NOT NULL,
    sequence_num BIGINT NOT NULL,
    event_type VARCHAR(50) NOT NULL,
    amount NUMERIC(18,2) NOT NULL,
    description VARCHAR(500),
    correlation_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ix_event_store_account_id_sequence_num
    ON event_store(account_id, sequence_num);

CREATE TABLE IF NOT EXISTS projected_state (
    account_id VARCHAR(50) PRIMARY KEY,
    current_balance NUMERIC(18,2) NOT NULL,
    last_processed_sequence BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS balance_events_log (
    id UUID PRIMARY KEY,
    account_id VARCHAR(50) NOT NULL,
    fact_id UUID NOT NULL,
    sequence_num BIGINT NOT NULL,
    event_type VARCHAR(50) NOT NULL,
    amount NUMERIC(18,2) NOT NULL,
    balance_before NUMERIC(18,2) NOT NULL,
    balance_after NUMERIC(18,2) NOT NULL,
    correlation_id UUID NOT NULL,
    received_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_balance_events_log_account_id_received_at
    ON balance_events_log(account_id, received_at DESC);
"#;
