//! Sequencer: turns commands into gap-free numbered facts.
//!
//! The fact store assigns `max + 1` inside a strict transaction. A lost race
//! surfaces as `SequenceConflict` and the command is deferred; the
//! redelivered command recomputes against the winner. There is no
//! in-process retry.
//!
//! The fact is published only after it is committed, and the command is
//! acknowledged only after the publish. A command redelivered after a
//! successful append (publish failure or crash before the ack) is appended
//! again as a new fact.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::bus::{publish_json, LogPublisher, MessageHandler, Outcome};
use crate::model::{Command, Fact};
use crate::storage::{FactStore, StorageError};

pub struct Sequencer {
    facts: Arc<dyn FactStore>,
    publisher: Arc<dyn LogPublisher>,
    facts_topic: String,
}

impl Sequencer {
    pub fn new(
        facts: Arc<dyn FactStore>,
        publisher: Arc<dyn LogPublisher>,
        facts_topic: impl Into<String>,
    ) -> Self {
        Self {
            facts,
            publisher,
            facts_topic: facts_topic.into(),
        }
    }

    /// Append `command` as the account's next fact and publish it.
    pub async fn sequence(&self, command: &Command) -> Outcome {
        let fact = match self.facts.append(command).await {
            Ok(fact) => fact,
            Err(StorageError::SequenceConflict {
                account_id,
                sequence_num,
            }) => {
                warn!(
                    account_id = %account_id,
                    sequence_num,
                    correlation_id = %command.correlation_id,
                    "Sequence conflict, command will be redelivered"
                );
                return Outcome::Deferred(format!(
                    "sequence {} for account {} already taken",
                    sequence_num, account_id
                ));
            }
            Err(e) => return Outcome::Failed(format!("failed to store fact: {}", e)),
        };

        info!(
            account_id = %fact.account_id,
            sequence_num = fact.sequence_num,
            kind = %fact.kind,
            amount = %fact.signed_amount,
            correlation_id = %fact.correlation_id,
            "Fact stored"
        );

        self.publish(&fact).await
    }

    async fn publish(&self, fact: &Fact) -> Outcome {
        match publish_json(
            self.publisher.as_ref(),
            &self.facts_topic,
            &fact.account_id,
            fact,
        )
        .await
        {
            Ok(()) => Outcome::Applied,
            Err(e) => Outcome::Failed(format!(
                "fact {} stored but not published: {}",
                fact.sequence_num, e
            )),
        }
    }
}

#[async_trait]
impl MessageHandler for Sequencer {
    type Message = Command;

    fn name(&self) -> &'static str {
        "sequencer"
    }

    async fn process(&self, _key: &str, command: Command) -> Outcome {
        self.sequence(&command).await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::bus::MockPublisher;
    use crate::storage::MockFactStore;
    use crate::test_utils::{credit, debit};

    const FACTS: &str = "account-facts";

    fn sequencer() -> (Sequencer, Arc<MockFactStore>, Arc<MockPublisher>) {
        let facts = Arc::new(MockFactStore::new());
        let publisher = Arc::new(MockPublisher::new());
        let sequencer = Sequencer::new(facts.clone(), publisher.clone(), FACTS);
        (sequencer, facts, publisher)
    }

    #[tokio::test]
    async fn test_sequence_assigns_and_publishes() {
        let (sequencer, facts, publisher) = sequencer();

        assert_eq!(sequencer.sequence(&credit("A1", 500)).await, Outcome::Applied);
        assert_eq!(sequencer.sequence(&debit("A1", 200)).await, Outcome::Applied);

        let stored = facts.list("A1").await.unwrap();
        let sequences: Vec<i64> = stored.iter().map(|f| f.sequence_num).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(stored[1].signed_amount, Decimal::from(-200));

        let published = publisher.take_published().await;
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|r| r.topic == FACTS && r.key == "A1"));
        let second: Fact = published[1].decode().unwrap();
        assert_eq!(second, stored[1]);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_per_account() {
        let (sequencer, facts, _) = sequencer();

        for _ in 0..3 {
            sequencer.sequence(&credit("A1", 1)).await;
        }
        sequencer.sequence(&credit("B2", 1)).await;

        assert_eq!(facts.max_sequence("A1").await.unwrap(), 3);
        assert_eq!(facts.max_sequence("B2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflict_is_deferred_and_heals_on_retry() {
        let (sequencer, facts, publisher) = sequencer();
        let first = credit("A1", 10);
        let second = credit("A1", 20);

        let (a, b) = tokio::join!(sequencer.sequence(&first), sequencer.sequence(&second));
        let lost = match (&a, &b) {
            (Outcome::Applied, Outcome::Deferred(_)) => &second,
            (Outcome::Deferred(_), Outcome::Applied) => &first,
            other => panic!("expected one deferral, got {:?}", other),
        };

        assert_eq!(sequencer.sequence(lost).await, Outcome::Applied);

        let sequences: Vec<i64> = facts
            .list("A1")
            .await
            .unwrap()
            .iter()
            .map(|f| f.sequence_num)
            .collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(publisher.published_count().await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_failed_without_publish() {
        let (sequencer, facts, publisher) = sequencer();
        facts.set_fail_on_append(true).await;

        let outcome = sequencer.sequence(&credit("A1", 10)).await;

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(publisher.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_failed_after_store() {
        let (sequencer, facts, publisher) = sequencer();
        publisher.set_fail_on_publish(true).await;

        let outcome = sequencer.sequence(&credit("A1", 10)).await;

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(facts.stored_count().await, 1);
    }
}
