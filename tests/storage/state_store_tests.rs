//! StateStore interface tests.
//!
//! These tests verify the contract of the StateStore trait.
//! Each storage implementation should run these tests.

use rust_decimal::Decimal;

use ledgerline::model::Step;
use ledgerline::storage::StateStore;

use super::fact_at;

pub async fn test_get_nonexistent<S: StateStore>(store: &S) {
    let state = store
        .get("test_state_missing")
        .await
        .expect("get should succeed");
    assert!(state.is_none(), "untouched account should have no state");
}

pub async fn test_apply_folds_in_order<S: StateStore>(store: &S) {
    let account = "test_state_fold";

    let step = store.apply(&fact_at(account, 1, 500)).await.unwrap();
    assert!(matches!(
        step,
        Step::Advance { balance_before, balance_after, .. }
            if balance_before == Decimal::ZERO && balance_after == Decimal::from(500)
    ));

    let step = store.apply(&fact_at(account, 2, -200)).await.unwrap();
    assert!(matches!(
        step,
        Step::Advance { balance_before, balance_after, .. }
            if balance_before == Decimal::from(500) && balance_after == Decimal::from(300)
    ));

    let state = store.get(account).await.unwrap().expect("state should exist");
    assert_eq!(state.current_balance, Decimal::from(300));
    assert_eq!(state.last_processed_sequence, 2);
}

pub async fn test_apply_duplicate_is_noop<S: StateStore>(store: &S) {
    let account = "test_state_dup";
    let fact = fact_at(account, 1, 75);

    store.apply(&fact).await.unwrap();
    let step = store.apply(&fact).await.unwrap();
    assert_eq!(step, Step::Duplicate { last_processed: 1 });

    let state = store.get(account).await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(75));
    assert_eq!(state.last_processed_sequence, 1);
}

pub async fn test_apply_gap_leaves_state<S: StateStore>(store: &S) {
    let account = "test_state_gap";

    store.apply(&fact_at(account, 1, 10)).await.unwrap();
    let step = store.apply(&fact_at(account, 3, 5)).await.unwrap();
    assert_eq!(
        step,
        Step::Gap {
            expected: 2,
            received: 3
        }
    );

    let state = store.get(account).await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(10));
    assert_eq!(state.last_processed_sequence, 1);

    store.apply(&fact_at(account, 2, 1)).await.unwrap();
    store.apply(&fact_at(account, 3, 5)).await.unwrap();
    let state = store.get(account).await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(16));
    assert_eq!(state.last_processed_sequence, 3);
}

pub async fn test_gap_on_fresh_account_creates_nothing<S: StateStore>(store: &S) {
    let account = "test_state_fresh_gap";

    let step = store.apply(&fact_at(account, 2, 10)).await.unwrap();
    assert_eq!(
        step,
        Step::Gap {
            expected: 1,
            received: 2
        }
    );
    assert!(store.get(account).await.unwrap().is_none());
}

pub async fn test_decimal_precision<S: StateStore>(store: &S) {
    let account = "test_state_cents";
    let mut first = fact_at(account, 1, 0);
    first.signed_amount = Decimal::new(1005, 2);
    let mut second = fact_at(account, 2, 0);
    second.signed_amount = Decimal::new(-255, 2);

    store.apply(&first).await.unwrap();
    store.apply(&second).await.unwrap();

    let state = store.get(account).await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::new(750, 2));
}

/// Run all StateStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_state_store_tests {
    ($store:expr) => {
        use $crate::storage::state_store_tests::*;

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_apply_folds_in_order($store).await;
        println!("  test_apply_folds_in_order: PASSED");

        test_apply_duplicate_is_noop($store).await;
        println!("  test_apply_duplicate_is_noop: PASSED");

        test_apply_gap_leaves_state($store).await;
        println!("  test_apply_gap_leaves_state: PASSED");

        test_gap_on_fresh_account_creates_nothing($store).await;
        println!("  test_gap_on_fresh_account_creates_nothing: PASSED");

        test_decimal_precision($store).await;
        println!("  test_decimal_precision: PASSED");
    };
}
