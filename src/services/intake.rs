//! Command intake: validation and publication of credit/debit requests.
//!
//! This is the only synchronous accept/reject boundary. Anything that goes
//! wrong after a command is on the log is resolved by redelivery and never
//! reaches the caller.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::bus::{publish_json, BusError, LogPublisher};
use crate::model::{
    Command, EntryKind, UnknownKind, AMOUNT_LIMIT, AMOUNT_SCALE, MAX_ACCOUNT_ID_LEN,
    MAX_DESCRIPTION_LEN,
};

/// Reasons a request is rejected at intake.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("account id must not be blank")]
    MissingAccount,

    #[error("account id is {len} characters, at most {max} allowed")]
    AccountTooLong { len: usize, max: usize },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("amount {0} has more than {scale} decimal places", scale = AMOUNT_SCALE)]
    AmountPrecision(Decimal),

    #[error("amount {0} is out of range (must be below {limit})", limit = AMOUNT_LIMIT)]
    AmountTooLarge(Decimal),

    #[error("description is {len} characters, at most {max} allowed")]
    DescriptionTooLong { len: usize, max: usize },

    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error("failed to publish command: {0}")]
    Publish(#[from] BusError),
}

/// An unvalidated credit/debit request, as accepted on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeRequest {
    pub account_id: String,
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl IntakeRequest {
    /// Check the request and turn it into a command with a fresh
    /// correlation id.
    ///
    /// Everything accepted here fits the storage columns unchanged, so a
    /// command never fails downstream for its shape alone.
    pub fn validate(&self) -> Result<Command, IntakeError> {
        let account_id = self.account_id.trim();
        if account_id.is_empty() {
            return Err(IntakeError::MissingAccount);
        }
        let len = account_id.chars().count();
        if len > MAX_ACCOUNT_ID_LEN {
            return Err(IntakeError::AccountTooLong {
                len,
                max: MAX_ACCOUNT_ID_LEN,
            });
        }

        if self.amount <= Decimal::ZERO {
            return Err(IntakeError::NonPositiveAmount(self.amount));
        }
        if self.amount >= Decimal::from(AMOUNT_LIMIT) {
            return Err(IntakeError::AmountTooLarge(self.amount));
        }
        // Trailing zeros do not count against the scale.
        let amount = self.amount.normalize();
        if amount.scale() > AMOUNT_SCALE {
            return Err(IntakeError::AmountPrecision(self.amount));
        }

        let kind: EntryKind = self.kind.parse()?;

        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(d) = description {
            let len = d.chars().count();
            if len > MAX_DESCRIPTION_LEN {
                return Err(IntakeError::DescriptionTooLong {
                    len,
                    max: MAX_DESCRIPTION_LEN,
                });
            }
        }

        Ok(Command {
            correlation_id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            kind,
            amount: self.amount,
            description: description.map(str::to_string),
            issued_at: Utc::now(),
        })
    }
}

/// Publishes validated commands to the commands topic.
pub struct CommandIntake {
    publisher: Arc<dyn LogPublisher>,
    commands_topic: String,
}

impl CommandIntake {
    pub fn new(publisher: Arc<dyn LogPublisher>, commands_topic: impl Into<String>) -> Self {
        Self {
            publisher,
            commands_topic: commands_topic.into(),
        }
    }

    /// Validate and publish a request; returns the command's correlation id.
    pub async fn submit(&self, request: &IntakeRequest) -> Result<Uuid, IntakeError> {
        let command = request.validate()?;
        publish_json(
            self.publisher.as_ref(),
            &self.commands_topic,
            &command.account_id,
            &command,
        )
        .await?;

        info!(
            account_id = %command.account_id,
            kind = %command.kind,
            amount = %command.amount,
            correlation_id = %command.correlation_id,
            "Command accepted"
        );
        Ok(command.correlation_id)
    }
}
