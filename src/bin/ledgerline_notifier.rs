//! ledgerline-notifier: balance changes → notification log

use std::sync::Arc;

use tracing::info;

use ledgerline::bus::{init_transport, LoopSettings};
use ledgerline::config::Config;
use ledgerline::services::Notifier;
use ledgerline::storage::init_storage;
use ledgerline::utils::bootstrap::{init_tracing, Workers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let stores = init_storage(&config.storage).await?;
    let transport = init_transport(&config.messaging).await?;

    let notifier = Arc::new(Notifier::new(stores.notifications));

    let mut workers = Workers::new();
    workers
        .spawn(
            notifier,
            transport.subscriber.as_ref(),
            &config.topics.balance_changes,
            &config.consumer.notifier_group,
            config.consumer.workers,
            LoopSettings::from(&config.consumer),
        )
        .await?;

    info!(
        balance_changes = %config.topics.balance_changes,
        "ledgerline-notifier started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    workers.shutdown().await;

    Ok(())
}
