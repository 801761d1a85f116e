mod bootstrap;
mod health;
mod poll_loop;

use std::time::Duration;

use anyhow::Result;
use casebot_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use casebot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging depends on config, so config errors surface on stderr via anyhow.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.poller.is_some(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_task = app.poller.clone().map(|poller| {
        let interval = Duration::from_secs(app.config.poller.interval_secs);
        tokio::spawn(poll_loop::run(poller, interval, shutdown_rx))
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        poller_enabled = poll_task.is_some(),
        "casebot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "casebot-server stopping"
    );

    let _ = shutdown_tx.send(true);
    if let Some(task) = poll_task {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, task).await.is_err() {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "poll loop did not stop within the grace period"
            );
        }
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
