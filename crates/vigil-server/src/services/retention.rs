//! Periodic retention pruning.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vigil_core::{Monitor, RetentionPolicy};

/// Apply `policy` at startup and then every `every` until `cancel` fires.
pub async fn run(
    monitor: Arc<Monitor>,
    policy: RetentionPolicy,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(
        max_records = policy.max_records,
        max_age_days = policy.max_age_days,
        interval_secs = every.as_secs(),
        "Starting retention task"
    );
    let mut ticker = interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match monitor.prune(&policy).await {
            Ok(report) if report.removed > 0 => {
                info!(removed = report.removed, "Old verdicts pruned")
            }
            Ok(_) => debug!("Nothing to prune"),
            Err(e) => error!(error = %e, "Retention pass failed"),
        }
    }
}
