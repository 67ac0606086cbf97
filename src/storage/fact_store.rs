//! FactStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Command, Fact};

/// Interface for the append-only fact log.
///
/// Facts are keyed by `(account_id, sequence_num)` with a uniqueness
/// constraint on that pair. For each account the stored sequence numbers
/// are exactly `1..=N`.
///
/// Implementations:
/// - `SqliteFactStore`: SQLite storage
/// - `PostgresFactStore`: PostgreSQL storage
/// - `MockFactStore`: In-memory mock for testing
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Sequence `command` and persist the resulting fact.
    ///
    /// Inside one strict transaction: read the account's highest sequence
    /// number (0 if none), insert the fact at `max + 1`, commit.
    /// A concurrent writer that committed the same sequence number first
    /// surfaces as `StorageError::SequenceConflict`; nothing is written and
    /// a retry recomputes against the winner.
    async fn append(&self, command: &Command) -> Result<Fact>;

    /// All facts for an account, ordered by sequence number.
    async fn list(&self, account_id: &str) -> Result<Vec<Fact>>;

    /// Highest stored sequence number for an account, 0 if none.
    async fn max_sequence(&self, account_id: &str) -> Result<i64>;
}
