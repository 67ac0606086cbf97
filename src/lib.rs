//! Ledgerline - event-sourced account ledger
//!
//! Commands are sequenced into a gap-free, per-account fact log and folded
//! into materialized balances. Every hop between services goes through an
//! ordered log keyed by account id.
//!
//! ```text
//! intake --commands--> Sequencer --facts--> Projector --balance changes--> Notifier
//!                          |                    |                              |
//!                      fact store          state store                notification log
//! ```

pub mod bus;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
