//! End-to-end pipeline tests over the in-process log.
//!
//! Run with: cargo test --test pipeline --features channel
//!
//! Intake, sequencer, projector and notifier run as real consumer loops
//! against mock stores; assertions are made once every topic has been
//! committed by its group.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use ledgerline::bus::{publish_json, InMemoryLog, LogPublisher, LoopSettings};
use ledgerline::config::{ConsumerConfig, TopicsConfig};
use ledgerline::model::{BalanceChanged, Command, EntryKind, Fact};
use ledgerline::services::{CommandIntake, IntakeRequest, Notifier, Projector, Sequencer};
use ledgerline::storage::{FactStore, NotificationStore, StateStore, Stores};
use ledgerline::utils::bootstrap::Workers;

const TIMEOUT: Duration = Duration::from_secs(10);

fn fast_settings() -> LoopSettings {
    LoopSettings {
        retry_delay: Duration::from_millis(10),
        defer_delay: Duration::from_millis(10),
    }
}

struct Pipeline {
    log: InMemoryLog,
    stores: Stores,
    topics: TopicsConfig,
    groups: ConsumerConfig,
    intake: CommandIntake,
    projector: Arc<Projector>,
    workers: Workers,
}

impl Pipeline {
    async fn start(workers_per_service: usize) -> Self {
        let log = InMemoryLog::new(4);
        let publisher: Arc<dyn LogPublisher> = Arc::new(log.clone());
        let stores = Stores::mock();
        let topics = TopicsConfig::default();
        let groups = ConsumerConfig::default();

        let sequencer = Arc::new(Sequencer::new(
            stores.facts.clone(),
            publisher.clone(),
            &topics.facts,
        ));
        let projector = Arc::new(Projector::new(
            stores.states.clone(),
            publisher.clone(),
            &topics.balance_changes,
        ));
        let notifier = Arc::new(Notifier::new(stores.notifications.clone()));

        let mut workers = Workers::new();
        workers
            .spawn(
                sequencer,
                &log,
                &topics.commands,
                &groups.sequencer_group,
                workers_per_service,
                fast_settings(),
            )
            .await
            .unwrap();
        workers
            .spawn(
                projector.clone(),
                &log,
                &topics.facts,
                &groups.projector_group,
                workers_per_service,
                fast_settings(),
            )
            .await
            .unwrap();
        workers
            .spawn(
                notifier,
                &log,
                &topics.balance_changes,
                &groups.notifier_group,
                workers_per_service,
                fast_settings(),
            )
            .await
            .unwrap();

        let intake = CommandIntake::new(publisher, &topics.commands);

        Self {
            log,
            stores,
            topics,
            groups,
            intake,
            projector,
            workers,
        }
    }

    async fn submit(&self, account_id: &str, kind: &str, amount: i64) -> Uuid {
        self.intake
            .submit(&IntakeRequest {
                account_id: account_id.to_string(),
                kind: kind.to_string(),
                amount: Decimal::from(amount),
                description: None,
            })
            .await
            .unwrap()
    }

    async fn publish_fact(&self, fact: &Fact) {
        publish_json(&self.log, &self.topics.facts, &fact.account_id, fact)
            .await
            .unwrap();
    }

    /// Wait until every topic has been committed by its group.
    async fn drain(&self) {
        let log = self.log.clone();
        let topics = self.topics.clone();
        let groups = self.groups.clone();
        eventually(move || {
            let log = log.clone();
            let topics = topics.clone();
            let groups = groups.clone();
            async move {
                log.pending(&topics.commands, &groups.sequencer_group) == 0
                    && log.pending(&topics.facts, &groups.projector_group) == 0
                    && log.pending(&topics.balance_changes, &groups.notifier_group) == 0
            }
        })
        .await;
    }

    fn balance_changes(&self) -> Vec<BalanceChanged> {
        self.log
            .records(&self.topics.balance_changes)
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    async fn sequences(&self, account_id: &str) -> Vec<i64> {
        self.stores
            .facts
            .list(account_id)
            .await
            .unwrap()
            .iter()
            .map(|f| f.sequence_num)
            .collect()
    }

    async fn stop(self) {
        tokio::time::timeout(TIMEOUT, self.workers.shutdown())
            .await
            .expect("workers should stop");
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn fact(account_id: &str, sequence_num: i64, signed_amount: i64) -> Fact {
    Fact {
        fact_id: Uuid::new_v4(),
        account_id: account_id.to_string(),
        sequence_num,
        kind: if signed_amount < 0 {
            EntryKind::Debit
        } else {
            EntryKind::Credit
        },
        signed_amount: Decimal::from(signed_amount),
        description: None,
        correlation_id: Uuid::new_v4(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_credit_then_debit_end_to_end() {
    let pipeline = Pipeline::start(1).await;

    let credit_id = pipeline.submit("A1", "credit", 500).await;
    let debit_id = pipeline.submit("A1", "debit", 200).await;
    pipeline.drain().await;

    let facts = pipeline.stores.facts.list("A1").await.unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(
        (facts[0].sequence_num, facts[0].signed_amount, facts[0].correlation_id),
        (1, Decimal::from(500), credit_id)
    );
    assert_eq!(
        (facts[1].sequence_num, facts[1].signed_amount, facts[1].correlation_id),
        (2, Decimal::from(-200), debit_id)
    );

    let state = pipeline.stores.states.get("A1").await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(300));
    assert_eq!(state.last_processed_sequence, 2);

    let changes = pipeline.balance_changes();
    let steps: Vec<(Decimal, Decimal)> = changes
        .iter()
        .map(|c| (c.balance_before, c.balance_after))
        .collect();
    assert_eq!(
        steps,
        vec![
            (Decimal::ZERO, Decimal::from(500)),
            (Decimal::from(500), Decimal::from(300)),
        ]
    );

    let notifications = pipeline.stores.notifications.list("A1").await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].balance_after, Decimal::from(300));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_sequences_are_gap_free_across_accounts_and_workers() {
    let pipeline = Pipeline::start(3).await;
    let accounts = ["A1", "B2", "C3", "D4", "E5"];

    for round in 1..=10i64 {
        for account in accounts {
            pipeline.submit(account, "credit", round).await;
        }
    }
    pipeline.drain().await;

    for account in accounts {
        assert_eq!(
            pipeline.sequences(account).await,
            (1..=10).collect::<Vec<i64>>()
        );
        let state = pipeline.stores.states.get(account).await.unwrap().unwrap();
        assert_eq!(state.current_balance, Decimal::from(55));
        assert_eq!(state.last_processed_sequence, 10);
    }
    assert_eq!(pipeline.balance_changes().len(), 50);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_duplicate_fact_is_projected_once() {
    let pipeline = Pipeline::start(1).await;
    let first = fact("D1", 1, 40);

    pipeline.publish_fact(&first).await;
    pipeline.publish_fact(&first).await;
    pipeline.drain().await;

    let state = pipeline.stores.states.get("D1").await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(40));
    assert_eq!(state.last_processed_sequence, 1);
    assert_eq!(pipeline.balance_changes().len(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_fact_ahead_of_predecessor_waits_for_it() {
    let pipeline = Pipeline::start(1).await;
    let first = fact("G1", 1, 100);
    let second = fact("G1", 2, -30);

    pipeline.publish_fact(&second).await;

    // The early fact keeps being deferred and nothing is projected.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pipeline.stores.states.get("G1").await.unwrap().is_none());
    assert_eq!(
        pipeline
            .log
            .pending(&pipeline.topics.facts, &pipeline.groups.projector_group),
        1
    );

    // The predecessor arrives through another worker.
    pipeline.projector.project(&first).await;
    pipeline.drain().await;

    let state = pipeline.stores.states.get("G1").await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(70));
    assert_eq!(state.last_processed_sequence, 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_concurrent_sequencers_heal_conflicts() {
    let log = InMemoryLog::new(1);
    let stores = Stores::mock();
    let publisher: Arc<dyn LogPublisher> = Arc::new(log.clone());
    let sequencer = Arc::new(Sequencer::new(
        stores.facts.clone(),
        publisher.clone(),
        "account-facts",
    ));

    // Two routes to the same account, as during a rebalance.
    let mut workers = Workers::new();
    for topic in ["commands-left", "commands-right"] {
        workers
            .spawn(sequencer.clone(), &log, topic, "sequencer", 1, fast_settings())
            .await
            .unwrap();
    }

    let mut correlation_ids = Vec::new();
    for (topic, amount) in [("commands-left", 10), ("commands-right", 20)] {
        let command = Command {
            correlation_id: Uuid::new_v4(),
            account_id: "R1".to_string(),
            kind: EntryKind::Credit,
            amount: Decimal::from(amount),
            description: None,
            issued_at: Utc::now(),
        };
        correlation_ids.push(command.correlation_id);
        publish_json(publisher.as_ref(), topic, "R1", &command)
            .await
            .unwrap();
    }

    let check_log = log.clone();
    eventually(move || {
        let log = check_log.clone();
        async move {
            log.pending("commands-left", "sequencer") == 0
                && log.pending("commands-right", "sequencer") == 0
        }
    })
    .await;

    let facts = stores.facts.list("R1").await.unwrap();
    let sequences: Vec<i64> = facts.iter().map(|f| f.sequence_num).collect();
    assert_eq!(sequences, vec![1, 2]);
    let mut stored_ids: Vec<Uuid> = facts.iter().map(|f| f.correlation_id).collect();
    stored_ids.sort();
    correlation_ids.sort();
    assert_eq!(stored_ids, correlation_ids);
    assert_eq!(log.topic_len("account-facts"), 2);

    tokio::time::timeout(TIMEOUT, workers.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_undecodable_command_does_not_block_account() {
    let pipeline = Pipeline::start(1).await;

    pipeline
        .log
        .publish(&pipeline.topics.commands, "H1", b"not json".to_vec())
        .await
        .unwrap();
    pipeline.submit("H1", "credit", 9).await;
    pipeline.drain().await;

    assert_eq!(pipeline.sequences("H1").await, vec![1]);
    let state = pipeline.stores.states.get("H1").await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(9));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_restart_resumes_from_committed_offsets() {
    let pipeline = Pipeline::start(1).await;

    pipeline.submit("K1", "credit", 5).await;
    pipeline.drain().await;

    // A restarted group resumes after what it committed; nothing is redone.
    pipeline
        .log
        .rewind_group(&pipeline.topics.facts, &pipeline.groups.projector_group);
    pipeline.submit("K1", "credit", 6).await;
    pipeline.drain().await;

    let state = pipeline.stores.states.get("K1").await.unwrap().unwrap();
    assert_eq!(state.current_balance, Decimal::from(11));
    assert_eq!(state.last_processed_sequence, 2);
    assert_eq!(pipeline.balance_changes().len(), 2);

    pipeline.stop().await;
}
