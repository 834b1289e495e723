use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use embudo_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "EMBUDO_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "EMBUDO_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "EMBUDO_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "channel.base_url",
        &config.channel.base_url,
        source("channel.base_url", "EMBUDO_CHANNEL_BASE_URL"),
    ));
    lines.push(render_line(
        "channel.api_key",
        redact_secret(config.channel.api_key.expose_secret()),
        source("channel.api_key", "EMBUDO_CHANNEL_API_KEY"),
    ));
    lines.push(render_line(
        "channel.instance",
        &config.channel.instance,
        source("channel.instance", "EMBUDO_CHANNEL_INSTANCE"),
    ));
    lines.push(render_line(
        "channel.owner_identity",
        &config.channel.owner_identity,
        source("channel.owner_identity", "EMBUDO_CHANNEL_OWNER_IDENTITY"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "EMBUDO_LLM_PROVIDER"),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", "EMBUDO_LLM_MODEL"),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "EMBUDO_LLM_BASE_URL"),
    ));
    lines.push(render_line(
        "llm.api_key",
        if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
        source("llm.api_key", "EMBUDO_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "EMBUDO_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "EMBUDO_SERVER_PORT"),
    ));

    lines.push(render_line(
        "pacing.enabled",
        &config.pacing.enabled.to_string(),
        source("pacing.enabled", "EMBUDO_PACING_ENABLED"),
    ));

    lines.push(render_line(
        "pricing.base_price",
        &config.pricing.base_price.to_string(),
        source("pricing.base_price", "EMBUDO_PRICING_BASE_PRICE"),
    ));
    lines.push(render_line(
        "pricing.upsell_price",
        &config.pricing.upsell_price.to_string(),
        source("pricing.upsell_price", "EMBUDO_PRICING_UPSELL_PRICE"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "EMBUDO_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "EMBUDO_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("embudo.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/embudo.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> &'static str {
    if secret.trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
