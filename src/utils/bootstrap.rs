//! Bootstrap utilities for ledgerline binaries.
//!
//! Shared initialization code for the service binaries.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bus::{run_consumer, BusError, LogSubscriber, LoopSettings, MessageHandler};
use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the LEDGERLINE_LOG environment variable.
///
/// Defaults to "info" level if LEDGERLINE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Consumer loops sharing one shutdown signal.
pub struct Workers {
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Workers {
    fn default() -> Self {
        Self::new()
    }
}

impl Workers {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Subscribe `count` consumers of `topic` in `group` and run `handler`
    /// on each.
    pub async fn spawn<H: MessageHandler>(
        &mut self,
        handler: Arc<H>,
        subscriber: &dyn LogSubscriber,
        topic: &str,
        group: &str,
        count: usize,
        settings: LoopSettings,
    ) -> Result<(), BusError> {
        for _ in 0..count.max(1) {
            let consumer = subscriber.subscribe(topic, group).await?;
            self.tasks.push(tokio::spawn(run_consumer(
                handler.clone(),
                consumer,
                settings,
                self.cancel.subscribe(),
            )));
        }
        info!(
            handler = handler.name(),
            topic = %topic,
            group = %group,
            workers = count.max(1),
            "Workers started"
        );
        Ok(())
    }

    /// Number of running loops.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every loop to stop and wait for in-flight messages to settle.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Consumer task panicked");
            }
        }
        info!("Workers stopped");
    }
}
