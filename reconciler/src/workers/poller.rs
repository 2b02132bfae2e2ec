//! Periodic status poller

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::sync::aggregator::StatusAggregator;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Initial delay before first poll
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the poller worker until the shutdown signal fires
pub async fn run<S, F>(
    options: &Options,
    aggregator: &StatusAggregator,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Poller worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        debug!("Polling platform status...");

        let report = aggregator.check_all().await;
        if report.is_synced() {
            debug!("All platforms synced");
        } else {
            warn!(
                "Platforms {:?}: {} issue(s)",
                report.overall,
                report.issues.len()
            );
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
