use std::sync::Arc;

use crate::commands::{runtime, CommandResult};
use casebot_core::config::{AppConfig, LoadOptions};
use casebot_db::repositories::{RegistrationRepository, SqlRegistrationRepository};
use casebot_db::{connect_with_config, CaseDirectory};
use casebot_slack::messages::sitrep_report;

/// Renders the report from the registration log. Nothing is posted to Slack.
pub fn run(json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sitrep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("sitrep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let log: Arc<dyn RegistrationRepository> =
            Arc::new(SqlRegistrationRepository::new(pool.clone()));
        let cases = CaseDirectory::new(log)
            .canonical_cases()
            .await
            .map_err(|error| ("registration_read", error.to_string(), 5u8))?;
        pool.close().await;

        let records = cases.into_iter().map(|entry| entry.record).collect::<Vec<_>>();
        Ok::<String, (&'static str, String, u8)>(sitrep_report(&records))
    });

    match result {
        Ok(report) if json_output => CommandResult::success("sitrep", report),
        Ok(report) => CommandResult { exit_code: 0, output: report },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sitrep", error_class, message, exit_code)
        }
    }
}
