use std::sync::Arc;

use casebot_core::config::{AppConfig, ConfigError, LoadOptions};
use casebot_db::repositories::{
    RegistrationRepository, SqlRegistrationRepository, SqlTrackedCaseRepository,
    TrackedCaseRepository,
};
use casebot_db::{
    connect_with_config, migrations, CaseDirectory, DbPool, FirstInResolver, RegistrationGuard,
};
use casebot_slack::{ChatNotifier, NotifierError, SlackWebNotifier};
use casebot_support::{CaseUpdatePoller, CloudSupportClient, TicketingApi, TicketingError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    /// Present only when `poller.enabled` is set.
    pub poller: Option<Arc<CaseUpdatePoller>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client setup failed: {0}")]
    Notifier(#[source] NotifierError),
    #[error("support client setup failed: {0}")]
    Ticketing(#[source] TicketingError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let poller = build_poller(&config, &db_pool)?.map(Arc::new);
    Ok(Application { config, db_pool, poller })
}

fn build_poller(
    config: &AppConfig,
    db_pool: &DbPool,
) -> Result<Option<CaseUpdatePoller>, BootstrapError> {
    let parent = match (config.poller.enabled, &config.support.parent) {
        (true, Some(parent)) => parent.clone(),
        _ => {
            info!(
                event_name = "system.bootstrap.poller_disabled",
                correlation_id = "bootstrap",
                "case update poller disabled"
            );
            return Ok(None);
        }
    };

    let log: Arc<dyn RegistrationRepository> =
        Arc::new(SqlRegistrationRepository::new(db_pool.clone()));
    let tracked: Arc<dyn TrackedCaseRepository> =
        Arc::new(SqlTrackedCaseRepository::new(db_pool.clone()));
    let notifier: Arc<dyn ChatNotifier> =
        Arc::new(SlackWebNotifier::from_config(&config.slack).map_err(BootstrapError::Notifier)?);
    let api: Arc<dyn TicketingApi> = Arc::new(
        CloudSupportClient::from_config(&config.support).map_err(BootstrapError::Ticketing)?,
    );

    info!(
        event_name = "system.bootstrap.poller_ready",
        correlation_id = "bootstrap",
        parent = %parent,
        interval_secs = config.poller.interval_secs,
        "case update poller configured"
    );

    Ok(Some(CaseUpdatePoller::new(
        api,
        notifier,
        RegistrationGuard::new(log.clone()),
        FirstInResolver::new(log.clone()),
        CaseDirectory::new(log),
        tracked,
        parent,
    )))
}
