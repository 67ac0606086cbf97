//! Ledger domain types.
//!
//! - `Command`: a request to credit or debit an account (transient)
//! - `Fact`: an immutable, sequence-numbered record of an applied command
//! - `MaterializedState`: the folded balance and watermark for one account
//! - `BalanceChanged`: broadcast of a single fold step
//! - `Notification`: one row of the downstream notification log

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    /// Wire/storage name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
        }
    }

    /// Apply the kind's sign to an unsigned amount.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            EntryKind::Credit => amount,
            EntryKind::Debit => -amount,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known entry kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entry kind '{0}' (expected 'credit' or 'debit')")]
pub struct UnknownKind(pub String);

impl FromStr for EntryKind {
    type Err = UnknownKind;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(EntryKind::Credit),
            "debit" => Ok(EntryKind::Debit),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Longest account id the stores hold.
pub const MAX_ACCOUNT_ID_LEN: usize = 50;

/// Longest entry description the stores hold.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Decimal places kept for amounts and balances.
pub const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound on an amount: sixteen integer digits.
pub const AMOUNT_LIMIT: i64 = 10_000_000_000_000_000;

/// A validated request to apply a credit or debit.
///
/// `amount` is always positive; the sign comes from `kind` when the
/// sequencer turns the command into a [`Fact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub correlation_id: Uuid,
    pub account_id: String,
    pub kind: EntryKind,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// An immutable, sequence-numbered ledger entry.
///
/// For a fixed `account_id` the persisted sequence numbers are exactly
/// `1..=N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: Uuid,
    pub account_id: String,
    pub sequence_num: i64,
    pub kind: EntryKind,
    pub signed_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Build the fact for `command` at position `sequence_num`.
    pub fn assign(command: &Command, sequence_num: i64) -> Self {
        Self {
            fact_id: Uuid::new_v4(),
            account_id: command.account_id.clone(),
            sequence_num,
            kind: command.kind,
            signed_amount: command.kind.signed(command.amount),
            description: command.description.clone(),
            correlation_id: command.correlation_id,
            created_at: Utc::now(),
        }
    }
}

/// Folded balance for one account.
///
/// `current_balance` is the sum of `signed_amount` over facts
/// `1..=last_processed_sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedState {
    pub account_id: String,
    pub current_balance: Decimal,
    pub last_processed_sequence: i64,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of folding one fact into a [`MaterializedState`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The fact was already folded in; nothing changes.
    Duplicate { last_processed: i64 },
    /// A predecessor has not been observed yet.
    Gap { expected: i64, received: i64 },
    /// The fact is the next one; `next` is the state to persist.
    Advance {
        balance_before: Decimal,
        balance_after: Decimal,
        next: MaterializedState,
    },
}

impl MaterializedState {
    /// State of an account no fact has touched yet.
    pub fn empty(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            current_balance: Decimal::ZERO,
            last_processed_sequence: 0,
            updated_at: Utc::now(),
        }
    }

    /// Sequence number the next applicable fact must carry.
    pub fn expected_sequence(&self) -> i64 {
        self.last_processed_sequence + 1
    }

    /// Decide what `fact` does to this state.
    pub fn step(&self, fact: &Fact) -> Step {
        if fact.sequence_num <= self.last_processed_sequence {
            return Step::Duplicate {
                last_processed: self.last_processed_sequence,
            };
        }

        let expected = self.expected_sequence();
        if fact.sequence_num > expected {
            return Step::Gap {
                expected,
                received: fact.sequence_num,
            };
        }

        let balance_before = self.current_balance;
        let balance_after = balance_before + fact.signed_amount;
        Step::Advance {
            balance_before,
            balance_after,
            next: MaterializedState {
                account_id: self.account_id.clone(),
                current_balance: balance_after,
                last_processed_sequence: fact.sequence_num,
                updated_at: Utc::now(),
            },
        }
    }
}

/// Broadcast of one successful fold step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub fact_id: Uuid,
    pub account_id: String,
    pub sequence_num: i64,
    pub kind: EntryKind,
    /// Signed amount of the fact that caused the change.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub correlation_id: Uuid,
    pub produced_at: DateTime<Utc>,
}

impl BalanceChanged {
    pub fn from_step(fact: &Fact, balance_before: Decimal, balance_after: Decimal) -> Self {
        Self {
            fact_id: fact.fact_id,
            account_id: fact.account_id.clone(),
            sequence_num: fact.sequence_num,
            kind: fact.kind,
            amount: fact.signed_amount,
            balance_before,
            balance_after,
            correlation_id: fact.correlation_id,
            produced_at: Utc::now(),
        }
    }
}

/// A balance change as recorded by the notification log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub account_id: String,
    pub fact_id: Uuid,
    pub sequence_num: i64,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub correlation_id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    pub fn received(change: &BalanceChanged) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: change.account_id.clone(),
            fact_id: change.fact_id,
            sequence_num: change.sequence_num,
            kind: change.kind,
            amount: change.amount,
            balance_before: change.balance_before,
            balance_after: change.balance_after,
            correlation_id: change.correlation_id,
            received_at: Utc::now(),
        }
    }
}
