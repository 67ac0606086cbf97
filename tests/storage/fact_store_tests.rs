//! FactStore interface tests.
//!
//! These tests verify the contract of the FactStore trait.
//! Each storage implementation should run these tests.

use futures::future::join_all;
use rust_decimal::Decimal;

use ledgerline::model::EntryKind;
use ledgerline::storage::{FactStore, StorageError};

use super::command;

// =============================================================================
// FactStore::max_sequence / list tests
// =============================================================================

pub async fn test_empty_account<S: FactStore>(store: &S) {
    let account = "test_fact_empty";

    let max = store
        .max_sequence(account)
        .await
        .expect("max_sequence should succeed");
    assert_eq!(max, 0, "untouched account should have max 0");

    let facts = store.list(account).await.expect("list should succeed");
    assert!(facts.is_empty(), "untouched account should have no facts");
}

// =============================================================================
// FactStore::append tests
// =============================================================================

pub async fn test_append_assigns_dense_sequence<S: FactStore>(store: &S) {
    let account = "test_fact_dense";

    for amount in [500, 20, 7] {
        store
            .append(&command(account, EntryKind::Credit, amount))
            .await
            .expect("append should succeed");
    }

    let facts = store.list(account).await.unwrap();
    let sequences: Vec<i64> = facts.iter().map(|f| f.sequence_num).collect();
    assert_eq!(sequences, vec![1, 2, 3], "sequences should be exactly 1..=3");
    assert_eq!(store.max_sequence(account).await.unwrap(), 3);
}

pub async fn test_append_signs_amounts<S: FactStore>(store: &S) {
    let account = "test_fact_signs";

    let credit = store
        .append(&command(account, EntryKind::Credit, 500))
        .await
        .unwrap();
    let debit = store
        .append(&command(account, EntryKind::Debit, 200))
        .await
        .unwrap();

    assert_eq!(credit.signed_amount, Decimal::from(500));
    assert_eq!(debit.signed_amount, Decimal::from(-200));

    let facts = store.list(account).await.unwrap();
    assert_eq!(facts[1].kind, EntryKind::Debit);
    assert_eq!(facts[1].signed_amount, Decimal::from(-200));
}

pub async fn test_append_persists_fields<S: FactStore>(store: &S) {
    let account = "test_fact_fields";
    let mut cmd = command(account, EntryKind::Credit, 1);
    cmd.amount = Decimal::new(1234, 2);
    cmd.description = Some("opening deposit".to_string());

    let appended = store.append(&cmd).await.unwrap();
    let stored = store.list(account).await.unwrap().remove(0);

    assert_eq!(stored.fact_id, appended.fact_id);
    assert_eq!(stored.correlation_id, cmd.correlation_id);
    assert_eq!(stored.signed_amount, Decimal::new(1234, 2));
    assert_eq!(stored.description.as_deref(), Some("opening deposit"));
    assert_eq!(
        stored.created_at.timestamp(),
        appended.created_at.timestamp()
    );
}

pub async fn test_accounts_are_independent<S: FactStore>(store: &S) {
    let a = "test_fact_iso_a";
    let b = "test_fact_iso_b";

    store.append(&command(a, EntryKind::Credit, 1)).await.unwrap();
    store.append(&command(a, EntryKind::Credit, 1)).await.unwrap();
    let first_b = store.append(&command(b, EntryKind::Credit, 1)).await.unwrap();

    assert_eq!(first_b.sequence_num, 1, "each account starts at 1");
    assert_eq!(store.max_sequence(a).await.unwrap(), 2);
    assert_eq!(store.list(b).await.unwrap().len(), 1);
}

// =============================================================================
// Concurrency tests
// =============================================================================

/// Concurrent appends for one account, retried on conflict the way
/// redelivery would, end up with exactly `1..=n`.
pub async fn test_concurrent_appends_never_share_sequence<S: FactStore>(store: &S) {
    let account = "test_fact_concurrent";
    let n = 8;

    let attempts = (0..n).map(|i| async move {
        let cmd = command(account, EntryKind::Credit, i + 1);
        for _ in 0..100 {
            match store.append(&cmd).await {
                Ok(fact) => return fact.sequence_num,
                Err(StorageError::SequenceConflict { .. }) => tokio::task::yield_now().await,
                Err(e) => panic!("unexpected append error: {}", e),
            }
        }
        panic!("append did not succeed after retries");
    });
    let mut assigned = join_all(attempts).await;
    assigned.sort();

    assert_eq!(assigned, (1..=n).collect::<Vec<i64>>());

    let stored: Vec<i64> = store
        .list(account)
        .await
        .unwrap()
        .iter()
        .map(|f| f.sequence_num)
        .collect();
    assert_eq!(stored, (1..=n).collect::<Vec<i64>>());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all FactStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_fact_store_tests {
    ($store:expr) => {
        use $crate::storage::fact_store_tests::*;

        test_empty_account($store).await;
        println!("  test_empty_account: PASSED");

        test_append_assigns_dense_sequence($store).await;
        println!("  test_append_assigns_dense_sequence: PASSED");

        test_append_signs_amounts($store).await;
        println!("  test_append_signs_amounts: PASSED");

        test_append_persists_fields($store).await;
        println!("  test_append_persists_fields: PASSED");

        test_accounts_are_independent($store).await;
        println!("  test_accounts_are_independent: PASSED");

        test_concurrent_appends_never_share_sequence($store).await;
        println!("  test_concurrent_appends_never_share_sequence: PASSED");
    };
}
