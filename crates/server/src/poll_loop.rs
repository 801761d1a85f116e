use std::sync::Arc;
use std::time::Duration;

use casebot_support::CaseUpdatePoller;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

/// Ticks `poller` every `interval` until `shutdown` flips to `true` or its sender is dropped.
/// A pass that is still running when shutdown arrives is allowed to finish.
pub async fn run(
    poller: Arc<CaseUpdatePoller>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        event_name = "system.poller.start",
        correlation_id = "bootstrap",
        parent = %poller.parent(),
        interval_ms = interval.as_millis() as u64,
        "case update poll loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let correlation_id = Uuid::new_v4().to_string();
                match poller.tick().await {
                    Ok(summary) => info!(
                        event_name = "system.poller.tick",
                        correlation_id = %correlation_id,
                        observed = summary.observed,
                        registered = summary.registered,
                        notifications_sent = summary.notifications_sent,
                        skipped = summary.skipped,
                        closed = summary.closed,
                        failures = summary.failures,
                        "poll pass finished"
                    ),
                    Err(error) => warn!(
                        event_name = "system.poller.tick_failed",
                        correlation_id = %correlation_id,
                        error = %error,
                        "poll pass failed; retrying next interval"
                    ),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(event_name = "system.poller.stopped", correlation_id = "shutdown", "poll loop stopped");
}
