//! ledgerline-sequencer: command log → fact log
//!
//! Consumes the commands topic, assigns each command the next sequence
//! number of its account and publishes the resulting fact.
//!
//! ## Architecture
//! ```text
//! [commands topic] --> Sequencer --> [fact store]
//!                          |
//!                          v
//!                    [facts topic]
//! ```
//!
//! ## Configuration
//! - First argument or LEDGERLINE_CONFIG: YAML config file (optional)
//! - LEDGERLINE__STORAGE__POSTGRES__URI, LEDGERLINE__MESSAGING__KAFKA__BOOTSTRAP_SERVERS, ...

use std::sync::Arc;

use tracing::info;

use ledgerline::bus::{init_transport, LoopSettings};
use ledgerline::config::Config;
use ledgerline::services::Sequencer;
use ledgerline::storage::init_storage;
use ledgerline::utils::bootstrap::{init_tracing, Workers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let stores = init_storage(&config.storage).await?;
    let transport = init_transport(&config.messaging).await?;

    let sequencer = Arc::new(Sequencer::new(
        stores.facts,
        transport.publisher.clone(),
        &config.topics.facts,
    ));

    let mut workers = Workers::new();
    workers
        .spawn(
            sequencer,
            transport.subscriber.as_ref(),
            &config.topics.commands,
            &config.consumer.sequencer_group,
            config.consumer.workers,
            LoopSettings::from(&config.consumer),
        )
        .await?;

    info!(
        commands = %config.topics.commands,
        facts = %config.topics.facts,
        "ledgerline-sequencer started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    workers.shutdown().await;

    Ok(())
}
