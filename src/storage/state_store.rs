//! StateStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Fact, MaterializedState, Step};

/// Interface for materialized account balances.
///
/// One row per account, created lazily by the first applicable fact.
/// Only the projector writes here.
///
/// Implementations:
/// - `SqliteStateStore`: SQLite storage
/// - `PostgresStateStore`: PostgreSQL storage
/// - `MockStateStore`: In-memory mock for testing
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fold `fact` into its account's state under a per-account transaction.
    ///
    /// Loads the state (or the empty state), decides with
    /// [`MaterializedState::step`] and commits only a `Step::Advance`.
    /// The returned step has been durably applied when it is an advance.
    async fn apply(&self, fact: &Fact) -> Result<Step>;

    /// Current state for an account, `None` if no fact was applied yet.
    async fn get(&self, account_id: &str) -> Result<Option<MaterializedState>>;
}
