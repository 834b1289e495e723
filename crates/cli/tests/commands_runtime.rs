use std::env;
use std::sync::{Mutex, OnceLock};

use embudo_cli::commands::{migrate, purge, smoke};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[
            ("EMBUDO_CHANNEL_API_KEY", "evolution-test-key"),
            ("EMBUDO_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_reports_config_failure_without_a_channel_key() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn purge_reports_when_no_state_is_stored() {
    with_env(
        &[
            ("EMBUDO_CHANNEL_API_KEY", "evolution-test-key"),
            ("EMBUDO_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = purge::run("593999000001@s.whatsapp.net");
            assert_eq!(result.exit_code, 0, "expected idempotent purge success");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "purge");
            assert_eq!(payload["status"], "ok");
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains("no conversation state"), "unexpected message: {message}");
        },
    );
}

#[test]
fn purge_rejects_a_blank_identity() {
    with_env(&[], || {
        let result = purge::run("   ");
        assert_eq!(result.exit_code, 2, "expected invalid identity failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "purge");
        assert_eq!(payload["error_class"], "invalid_identity");
    });
}

#[test]
fn smoke_returns_success_report_with_valid_env() {
    with_env(
        &[
            ("EMBUDO_CHANNEL_API_KEY", "evolution-test-key"),
            ("EMBUDO_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = smoke::run();
            assert_eq!(result.exit_code, 0, "expected successful smoke report");

            let payload = parse_payload(last_line(&result.output));
            assert_eq!(payload["command"], "smoke");
            assert_eq!(payload["status"], "pass");
        },
    );
}

#[test]
fn smoke_walkthrough_counts_every_buyer_turn() {
    with_env(
        &[
            ("EMBUDO_CHANNEL_API_KEY", "evolution-test-key"),
            ("EMBUDO_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = smoke::run();
            assert_eq!(result.exit_code, 0, "expected successful smoke report");

            let payload = parse_payload(last_line(&result.output));
            let walkthrough = payload["checks"]
                .as_array()
                .and_then(|checks| {
                    checks.iter().find(|check| check["name"] == "funnel_walkthrough")
                })
                .cloned()
                .unwrap_or_default();
            assert_eq!(walkthrough["status"], "pass");
            let message = walkthrough["message"].as_str().unwrap_or_default();
            assert!(
                message.contains("completion in 6 turns"),
                "unexpected walkthrough message: {message}"
            );
        },
    );
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "EMBUDO_DATABASE_URL",
        "EMBUDO_DATABASE_MAX_CONNECTIONS",
        "EMBUDO_DATABASE_TIMEOUT_SECS",
        "EMBUDO_CHANNEL_BASE_URL",
        "EMBUDO_CHANNEL_API_KEY",
        "EMBUDO_CHANNEL_INSTANCE",
        "EMBUDO_CHANNEL_OWNER_IDENTITY",
        "EMBUDO_CHANNEL_TIMEOUT_SECS",
        "EMBUDO_LLM_PROVIDER",
        "EMBUDO_LLM_API_KEY",
        "EMBUDO_LLM_BASE_URL",
        "EMBUDO_LLM_MODEL",
        "EMBUDO_LLM_TIMEOUT_SECS",
        "EMBUDO_LLM_MAX_RETRIES",
        "EMBUDO_SERVER_BIND_ADDRESS",
        "EMBUDO_SERVER_PORT",
        "EMBUDO_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "EMBUDO_PACING_ENABLED",
        "EMBUDO_PACING_MAX_DELAY_MS",
        "EMBUDO_PRICING_BASE_PRICE",
        "EMBUDO_PRICING_UPSELL_PRICE",
        "EMBUDO_LOGGING_LEVEL",
        "EMBUDO_LOGGING_FORMAT",
        "EMBUDO_LOG_LEVEL",
        "EMBUDO_LOG_FORMAT",
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
