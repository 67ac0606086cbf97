//! Shared storage helper functions.
//!
//! Column decoding and driver-error classification used across the SQL
//! backends. SQLite keeps timestamps as fixed-width RFC3339 text and amounts
//! and ids as text; PostgreSQL reads all three natively but is written with
//! the same rendered literals.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Result, StorageError};
use crate::model::EntryKind;

/// SQLSTATE for a serializable transaction that lost to a concurrent one.
const SERIALIZATION_FAILURE: &str = "40001";

/// Parse a decimal column stored as text.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|_| StorageError::InvalidAmount(raw.to_string()))
}

/// Render a timestamp column.
///
/// Fixed-width UTC so that text ordering matches time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC3339 timestamp column.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(raw.to_string()))
}

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}

pub fn parse_kind(raw: &str) -> Result<EntryKind> {
    Ok(raw.parse::<EntryKind>()?)
}

/// Whether a driver error means another writer won the insert race.
///
/// Covers unique-constraint violations on every backend and PostgreSQL
/// serialization failures.
pub fn is_write_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || db.code().as_deref() == Some(SERIALIZATION_FAILURE)
        }
        _ => false,
    }
}

/// Map a failed fact write to `SequenceConflict` when it lost a race.
pub fn classify_fact_write(error: sqlx::Error, account_id: &str, sequence_num: i64) -> StorageError {
    if is_write_conflict(&error) {
        StorageError::SequenceConflict {
            account_id: account_id.to_string(),
            sequence_num,
        }
    } else {
        StorageError::Database(error)
    }
}
