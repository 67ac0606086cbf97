//! ledgerline-projector: fact log → materialized balances
//!
//! Folds facts into per-account state in sequence order and broadcasts one
//! balance change per applied fact.
//!
//! ## Architecture
//! ```text
//! [facts topic] --> Projector --> [state store]
//!                       |
//!                       v
//!              [balance changes topic]
//! ```

use std::sync::Arc;

use tracing::info;

use ledgerline::bus::{init_transport, LoopSettings};
use ledgerline::config::Config;
use ledgerline::services::Projector;
use ledgerline::storage::init_storage;
use ledgerline::utils::bootstrap::{init_tracing, Workers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let stores = init_storage(&config.storage).await?;
    let transport = init_transport(&config.messaging).await?;

    let projector = Arc::new(Projector::new(
        stores.states,
        transport.publisher.clone(),
        &config.topics.balance_changes,
    ));

    let mut workers = Workers::new();
    workers
        .spawn(
            projector,
            transport.subscriber.as_ref(),
            &config.topics.facts,
            &config.consumer.projector_group,
            config.consumer.workers,
            LoopSettings::from(&config.consumer),
        )
        .await?;

    info!(
        facts = %config.topics.facts,
        balance_changes = %config.topics.balance_changes,
        "ledgerline-projector started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    workers.shutdown().await;

    Ok(())
}
