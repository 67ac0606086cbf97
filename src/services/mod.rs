//! Ledger services.
//!
//! Each service is a `MessageHandler` built once with its store and
//! publisher handles and then driven by a consumer loop:
//! - `Sequencer`: commands → numbered facts
//! - `Projector`: facts → materialized balances + balance-change broadcasts
//! - `Notifier`: balance changes → notification log
//!
//! `CommandIntake` validates requests and puts commands on the log.

pub mod intake;
pub mod notifier;
pub mod projector;
pub mod sequencer;

pub use intake::{CommandIntake, IntakeError, IntakeRequest};
pub use notifier::Notifier;
pub use projector::Projector;
pub use sequencer::Sequencer;
