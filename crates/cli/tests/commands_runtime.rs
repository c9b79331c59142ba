use std::env;
use std::sync::{Mutex, OnceLock};

use budgetflow_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("BUDGETFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_fails_with_unreachable_database() {
    with_env(&[("BUDGETFLOW_DATABASE_URL", "sqlite:///nonexistent-dir/budgetflow.db")], || {
        let result = migrate::run();
        assert_ne!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn seed_loads_and_verifies_demo_dataset() {
    with_env(&[("BUDGETFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed to succeed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().expect("message");
        assert!(message.contains("6 accounts"), "unexpected summary: {message}");
    });
}

#[test]
fn doctor_json_reports_passing_checks() {
    with_env(&[("BUDGETFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let output = doctor::run(true);
        let payload: Value = serde_json::from_str(&output).expect("doctor output is JSON");

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "config_validation"));
        assert!(checks.iter().any(|check| check["name"] == "database_connectivity"));

        // A fresh in-memory database carries no schema yet, so the
        // structural checks report as skipped rather than failing the run.
        let ladders = checks
            .iter()
            .find(|check| check["name"] == "approval_ladders")
            .expect("approval_ladders check");
        assert_eq!(ladders["status"], "skipped");
        assert!(checks.iter().any(|check| check["name"] == "approver_coverage"));
    });
}

#[test]
fn doctor_fails_on_invalid_log_level() {
    with_env(
        &[
            ("BUDGETFLOW_DATABASE_URL", "sqlite::memory:"),
            ("BUDGETFLOW_LOG_LEVEL", "verbose"),
        ],
        || {
            let output = doctor::run(true);
            let payload: Value = serde_json::from_str(&output).expect("doctor output is JSON");
            assert_eq!(payload["overall_status"], "fail");
        },
    );
}

#[test]
fn config_renders_values_with_source_attribution() {
    with_env(&[("BUDGETFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let output = config::run();
        assert!(output.starts_with("effective config"));
        assert!(output.contains("database.url = sqlite::memory: (source: env (BUDGETFLOW_DATABASE_URL))"));
        assert!(output.contains("logging.level = info (source: default)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output is JSON")
}

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Runs `body` with the given env vars set and every other BUDGETFLOW_* var
/// cleared, serialized across tests because the environment is global.
fn with_env(vars: &[(&str, &str)], body: impl FnOnce()) {
    let guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    const MANAGED: &[&str] = &[
        "BUDGETFLOW_CONFIG",
        "BUDGETFLOW_DATABASE_URL",
        "BUDGETFLOW_LOG_LEVEL",
        "BUDGETFLOW_LOG_FORMAT",
        "BUDGETFLOW_BIND_ADDRESS",
        "BUDGETFLOW_PORT",
    ];

    let saved: Vec<(String, Option<String>)> =
        MANAGED.iter().map(|key| (key.to_string(), env::var(key).ok())).collect();

    for key in MANAGED {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    body();

    for (key, value) in saved {
        match value {
            Some(value) => env::set_var(&key, value),
            None => env::remove_var(&key),
        }
    }
    drop(guard);
}
