//! NotificationStore interface tests.

use rust_decimal::Decimal;

use ledgerline::model::BalanceChanged;
use ledgerline::storage::NotificationStore;

use super::fact_at;

pub async fn test_list_empty<S: NotificationStore>(store: &S) {
    let listed = store
        .list("test_note_empty")
        .await
        .expect("list should succeed");
    assert!(listed.is_empty());
}

pub async fn test_record_and_list_newest_first<S: NotificationStore>(store: &S) {
    let account = "test_note_order";
    let first = BalanceChanged::from_step(
        &fact_at(account, 1, 500),
        Decimal::ZERO,
        Decimal::from(500),
    );
    let second = BalanceChanged::from_step(
        &fact_at(account, 2, -200),
        Decimal::from(500),
        Decimal::from(300),
    );

    let recorded = store.record(&first).await.expect("record should succeed");
    assert_eq!(recorded.fact_id, first.fact_id);
    store.record(&second).await.unwrap();

    let listed = store.list(account).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].sequence_num, 2, "newest first");
    assert_eq!(listed[0].balance_before, Decimal::from(500));
    assert_eq!(listed[0].balance_after, Decimal::from(300));
    assert_eq!(listed[0].amount, Decimal::from(-200));
    assert_eq!(listed[1].sequence_num, 1);
}

pub async fn test_list_filters_by_account<S: NotificationStore>(store: &S) {
    let change = BalanceChanged::from_step(
        &fact_at("test_note_other", 1, 1),
        Decimal::ZERO,
        Decimal::ONE,
    );
    store.record(&change).await.unwrap();

    let listed = store.list("test_note_filtered").await.unwrap();
    assert!(listed.is_empty());
}

/// Run all NotificationStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_notification_store_tests {
    ($store:expr) => {
        use $crate::storage::notification_store_tests::*;

        test_list_empty($store).await;
        println!("  test_list_empty: PASSED");

        test_record_and_list_newest_first($store).await;
        println!("  test_record_and_list_newest_first: PASSED");

        test_list_filters_by_account($store).await;
        println!("  test_list_filters_by_account: PASSED");
    };
}
