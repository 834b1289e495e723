use embudo_core::config::{AppConfig, LlmProvider, LoadOptions};
use embudo_db::connect_with_settings;
use embudo_whatsapp::EvolutionClient;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });

            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    checks.push(check_database_connectivity(&runtime, &config));
                    checks.push(check_channel_connectivity(&runtime, &config));
                }
                Err(error) => {
                    let details = format!("failed to initialize async runtime: {error}");
                    for name in ["database_connectivity", "channel_connectivity"] {
                        checks.push(DoctorCheck {
                            name,
                            status: CheckStatus::Fail,
                            details: details.clone(),
                        });
                    }
                }
            }

            checks.push(check_classifier_credentials(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "channel_connectivity", "classifier_credentials"]
            {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database_connectivity(
    runtime: &tokio::runtime::Runtime,
    config: &AppConfig,
) -> DoctorCheck {
    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

/// Live probe against the Evolution API. A gateway that answers but reports a
/// closed session is still a pass here, the details line carries the state so
/// the operator can judge it.
fn check_channel_connectivity(
    runtime: &tokio::runtime::Runtime,
    config: &AppConfig,
) -> DoctorCheck {
    let client = match EvolutionClient::from_config(&config.channel) {
        Ok(client) => client,
        Err(error) => {
            return DoctorCheck {
                name: "channel_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to build channel client: {error}"),
            };
        }
    };

    match runtime.block_on(client.connection_state()) {
        Ok(state) => {
            let connection = state
                .pointer("/instance/state")
                .and_then(|value| value.as_str())
                .unwrap_or("unknown");
            DoctorCheck {
                name: "channel_connectivity",
                status: CheckStatus::Pass,
                details: format!(
                    "instance `{}` reports connection state `{connection}`",
                    config.channel.instance
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "channel_connectivity",
            status: CheckStatus::Fail,
            details: format!("failed to reach the Evolution API: {error}"),
        },
    }
}

fn check_classifier_credentials(config: &AppConfig) -> DoctorCheck {
    let details = if config.llm.provider == LlmProvider::Ollama {
        format!("provider `ollama` needs no API key (model `{}`)", config.llm.model)
    } else if config.llm.api_key.is_some() {
        format!("API key present for model `{}`", config.llm.model)
    } else {
        "no API key set, ambiguous replies fall back to stage defaults".to_string()
    };

    DoctorCheck { name: "classifier_credentials", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
