//! ledgerline-standalone: the whole pipeline in one process
//!
//! Runs the sequencer, projector and notifier loops against one storage
//! backend and one transport (the in-process log by default). Commands are
//! read from stdin, one JSON object per line:
//!
//! ```text
//! {"account_id": "A1", "kind": "credit", "amount": "500.00"}
//! {"account_id": "A1", "kind": "debit", "amount": "200.00", "description": "rent"}
//! ```
//!
//! ## Architecture
//! ```text
//! stdin --> CommandIntake --commands--> Sequencer --facts--> Projector
//!                                                                |
//!                                   Notifier <--balance changes--+
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use ledgerline::bus::{init_transport, LoopSettings};
use ledgerline::config::Config;
use ledgerline::services::{CommandIntake, IntakeRequest, Notifier, Projector, Sequencer};
use ledgerline::storage::init_storage;
use ledgerline::utils::bootstrap::{init_tracing, Workers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let stores = init_storage(&config.storage).await?;
    let transport = init_transport(&config.messaging).await?;
    let settings = LoopSettings::from(&config.consumer);
    let topics = &config.topics;

    let mut workers = Workers::new();
    workers
        .spawn(
            Arc::new(Sequencer::new(
                stores.facts.clone(),
                transport.publisher.clone(),
                &topics.facts,
            )),
            transport.subscriber.as_ref(),
            &topics.commands,
            &config.consumer.sequencer_group,
            config.consumer.workers,
            settings,
        )
        .await?;
    workers
        .spawn(
            Arc::new(Projector::new(
                stores.states.clone(),
                transport.publisher.clone(),
                &topics.balance_changes,
            )),
            transport.subscriber.as_ref(),
            &topics.facts,
            &config.consumer.projector_group,
            config.consumer.workers,
            settings,
        )
        .await?;
    workers
        .spawn(
            Arc::new(Notifier::new(stores.notifications.clone())),
            transport.subscriber.as_ref(),
            &topics.balance_changes,
            &config.consumer.notifier_group,
            config.consumer.workers,
            settings,
        )
        .await?;

    let intake = CommandIntake::new(transport.publisher.clone(), &topics.commands);
    info!(workers = workers.len(), "ledgerline-standalone started, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => submit(&intake, &line).await,
                None => {
                    info!("stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                }
            },
        }
    }

    info!("Shutting down");
    workers.shutdown().await;

    Ok(())
}

async fn submit(intake: &CommandIntake, line: &str) {
    let request: IntakeRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected malformed request");
            return;
        }
    };
    match intake.submit(&request).await {
        Ok(correlation_id) => println!("accepted {}", correlation_id),
        Err(e) => warn!(account_id = %request.account_id, error = %e, "Rejected request"),
    }
}
