//! Test builders shared by unit tests.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::{Command, EntryKind, Fact};

/// Build a command with a fresh correlation id.
pub fn command(account_id: &str, kind: EntryKind, amount: i64) -> Command {
    Command {
        correlation_id: Uuid::new_v4(),
        account_id: account_id.to_string(),
        kind,
        amount: Decimal::from(amount),
        description: None,
        issued_at: Utc::now(),
    }
}

pub fn credit(account_id: &str, amount: i64) -> Command {
    command(account_id, EntryKind::Credit, amount)
}

pub fn debit(account_id: &str, amount: i64) -> Command {
    command(account_id, EntryKind::Debit, amount)
}

/// Build a fact at `sequence_num` carrying `signed_amount`.
///
/// The kind follows the sign of the amount.
pub fn fact_at(account_id: &str, sequence_num: i64, signed_amount: i64) -> Fact {
    let kind = if signed_amount < 0 {
        EntryKind::Debit
    } else {
        EntryKind::Credit
    };
    Fact {
        fact_id: Uuid::new_v4(),
        account_id: account_id.to_string(),
        sequence_num,
        kind,
        signed_amount: Decimal::from(signed_amount),
        description: None,
        correlation_id: Uuid::new_v4(),
        created_at: Utc::now(),
    }
}
