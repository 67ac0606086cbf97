//! Projector: folds facts into materialized balances.
//!
//! Facts are applied strictly in sequence per account. A fact at or below
//! the watermark is a redelivery and is acknowledged without effect; a fact
//! beyond the next expected sequence is deferred until its predecessor has
//! been applied. Each applied fact is broadcast as a `BalanceChanged`, after
//! the state commit.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bus::{publish_json, LogPublisher, MessageHandler, Outcome};
use crate::model::{BalanceChanged, Fact, Step};
use crate::storage::StateStore;

pub struct Projector {
    states: Arc<dyn StateStore>,
    publisher: Arc<dyn LogPublisher>,
    balance_topic: String,
}

impl Projector {
    pub fn new(
        states: Arc<dyn StateStore>,
        publisher: Arc<dyn LogPublisher>,
        balance_topic: impl Into<String>,
    ) -> Self {
        Self {
            states,
            publisher,
            balance_topic: balance_topic.into(),
        }
    }

    /// Apply one fact to its account's state.
    pub async fn project(&self, fact: &Fact) -> Outcome {
        let step = match self.states.apply(fact).await {
            Ok(step) => step,
            Err(e) => return Outcome::Failed(format!("failed to apply fact: {}", e)),
        };

        match step {
            Step::Duplicate { last_processed } => {
                debug!(
                    account_id = %fact.account_id,
                    sequence_num = fact.sequence_num,
                    last_processed,
                    "Fact already applied, ignoring"
                );
                Outcome::Applied
            }
            Step::Gap { expected, received } => {
                warn!(
                    account_id = %fact.account_id,
                    expected,
                    received,
                    "Sequence gap, fact will be redelivered"
                );
                Outcome::Deferred(format!(
                    "sequence gap for account {}: expected {}, received {}",
                    fact.account_id, expected, received
                ))
            }
            Step::Advance {
                balance_before,
                balance_after,
                ..
            } => {
                info!(
                    account_id = %fact.account_id,
                    sequence_num = fact.sequence_num,
                    balance_before = %balance_before,
                    balance_after = %balance_after,
                    "Fact projected"
                );
                let change = BalanceChanged::from_step(fact, balance_before, balance_after);
                self.publish(&change).await
            }
        }
    }

    async fn publish(&self, change: &BalanceChanged) -> Outcome {
        match publish_json(
            self.publisher.as_ref(),
            &self.balance_topic,
            &change.account_id,
            change,
        )
        .await
        {
            Ok(()) => Outcome::Applied,
            Err(e) => Outcome::Failed(format!(
                "balance change {} committed but not published: {}",
                change.sequence_num, e
            )),
        }
    }
}

#[async_trait]
impl MessageHandler for Projector {
    type Message = Fact;

    fn name(&self) -> &'static str {
        "projector"
    }

    async fn process(&self, _key: &str, fact: Fact) -> Outcome {
        self.project(&fact).await
    }
}
