//! Shared storage integration tests.
//!
//! Tests the FactStore, StateStore and NotificationStore interfaces against
//! all implementations. Each backend test binary imports these test
//! functions and runs them through the runner macros.

#![allow(dead_code)]

pub mod fact_store_tests;
pub mod notification_store_tests;
pub mod state_store_tests;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use ledgerline::model::{Command, EntryKind, Fact};

/// Build a command for `account_id` with a fresh correlation id.
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

/// Build a fact at `sequence_num` carrying `signed_amount`.
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
