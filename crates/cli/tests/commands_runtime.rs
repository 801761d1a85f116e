use std::env;
use std::sync::{Mutex, OnceLock};

use casebot_cli::commands::{doctor, migrate, sitrep};
use serde_json::Value;
use tempfile::TempDir;

fn valid_env(database_url: &str) -> Vec<(&str, &str)> {
    vec![
        ("CASEBOT_SLACK_BOT_TOKEN", "xoxb-test"),
        ("CASEBOT_SUPPORT_ACCESS_TOKEN", "ya29.test"),
        ("CASEBOT_DATABASE_URL", database_url),
    ]
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_tokens() {
    with_env(&[("CASEBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_every_check_as_json() {
    with_env(&valid_env("sqlite::memory:"), || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "pass");
        let names = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| check["name"].as_str().expect("check name").to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "slack_token_readiness",
                "support_target",
                "database_connectivity"
            ]
        );
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[("CASEBOT_SLACK_BOT_TOKEN", "xapp-wrong")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn sitrep_over_fresh_database_reports_zero_cases() {
    let dir = TempDir::new().expect("tempdir");
    let database_url = format!("sqlite://{}", dir.path().join("casebot.db").display());

    with_env(&valid_env(&database_url), || {
        assert_eq!(migrate::run().exit_code, 0);

        let plain = sitrep::run(false);
        assert_eq!(plain.exit_code, 0);
        assert!(plain.output.contains("case,priority,title,escalated"));
        assert!(plain.output.ends_with("Total cases open: 0\nEscalated cases: 0"));

        let wrapped = parse_payload(&sitrep::run(true).output);
        assert_eq!(wrapped["command"], "sitrep");
        assert_eq!(wrapped["status"], "ok");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CASEBOT_DATABASE_URL",
        "CASEBOT_DATABASE_MAX_CONNECTIONS",
        "CASEBOT_DATABASE_TIMEOUT_SECS",
        "CASEBOT_SLACK_BOT_TOKEN",
        "CASEBOT_SLACK_API_BASE_URL",
        "CASEBOT_SUPPORT_BASE_URL",
        "CASEBOT_SUPPORT_PARENT",
        "CASEBOT_SUPPORT_ACCESS_TOKEN",
        "CASEBOT_SUPPORT_MAX_ATTEMPTS",
        "CASEBOT_SUPPORT_TIMEOUT_SECS",
        "CASEBOT_POLLER_ENABLED",
        "CASEBOT_POLLER_INTERVAL_SECS",
        "CASEBOT_SERVER_BIND_ADDRESS",
        "CASEBOT_SERVER_HEALTH_CHECK_PORT",
        "CASEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CASEBOT_LOGGING_LEVEL",
        "CASEBOT_LOGGING_FORMAT",
        "CASEBOT_LOG_LEVEL",
        "CASEBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
