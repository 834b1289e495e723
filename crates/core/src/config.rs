use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{CountryDiscount, PriceBook};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub pacing: PacingConfig,
    pub pricing: PriceBook,
    pub offer: OfferConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Evolution-API style WhatsApp gateway settings.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub instance: String,
    /// WhatsApp identity that receives operator notifications.
    pub owner_identity: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Human-cadence envelope for outbound replies. Delay is a base jitter plus
/// a per-character jitter, capped by `max_delay_ms`.
#[derive(Clone, Debug)]
pub struct PacingConfig {
    pub enabled: bool,
    pub presence: bool,
    pub typing: bool,
    pub min_base_ms: u64,
    pub max_base_ms: u64,
    pub min_char_ms: u64,
    pub max_char_ms: u64,
    pub max_delay_ms: u64,
}

/// Product, gift, and payment constants the handlers render into messages.
/// Injected read-only; nothing mutates it after load.
#[derive(Clone, Debug)]
pub struct OfferConfig {
    pub product_name: String,
    pub product_description: String,
    pub lead_magnet_name: String,
    pub lead_magnet_url: String,
    pub delivery_url: String,
    pub upsell_name: String,
    pub upsell_delivery_url: String,
    pub payment_link: String,
    pub bank: BankDetails,
}

#[derive(Clone, Debug)]
pub struct BankDetails {
    pub name: String,
    pub holder: String,
    pub account_number: String,
    pub account_type: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub channel_base_url: Option<String>,
    pub channel_api_key: Option<String>,
    pub owner_identity: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://embudo.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channel: ChannelConfig {
                base_url: "http://localhost:3000".to_string(),
                api_key: String::new().into(),
                instance: "default".to_string(),
                owner_identity: "593999496469".to_string(),
                timeout_secs: 20,
            },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                model: "claude-3-5-haiku-20241022".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            pacing: PacingConfig {
                enabled: true,
                presence: true,
                typing: true,
                min_base_ms: 500,
                max_base_ms: 1500,
                min_char_ms: 50,
                max_char_ms: 80,
                max_delay_ms: 10_000,
            },
            pricing: PriceBook::default(),
            offer: OfferConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            product_name:
                "LA BIBLIA DEL PROMPTING: GUÍA DEFINITIVA DE 0 A EXPERTO EN INGENIERÍA DE PROMPTS"
                    .to_string(),
            product_description:
                "¿Alguna vez has sentido la frustración de recibir respuestas genéricas, \
                 incompletas o erróneas de la Inteligencia Artificial?"
                    .to_string(),
            lead_magnet_name:
                "Cursos Gratis: Usar ChatGPT para trabajar + Automatización con IA".to_string(),
            lead_magnet_url:
                "https://drive.google.com/drive/folders/1Pg86uw1FTmTXM199xcRfmrcQwGdgJehv"
                    .to_string(),
            delivery_url:
                "https://drive.google.com/drive/folders/1pDcLPDmAlafsaP9svwg553F4gIdlv5Uc"
                    .to_string(),
            upsell_name: "CURSO AVANZADO DE IA Y AUTOMATIZACIÓN".to_string(),
            upsell_delivery_url:
                "https://drive.google.com/drive/folders/11ikoGWmF9JpTL-FpMkO0FL6Ir2KSIK_c"
                    .to_string(),
            payment_link: "https://paypal.me/embudo".to_string(),
            bank: BankDetails {
                name: "Banco Pichincha".to_string(),
                holder: "Angelo Benavides".to_string(),
                account_number: "2208483287".to_string(),
                account_type: "Ahorros Transaccional".to_string(),
            },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("embudo.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(base_url) = channel.base_url {
                self.channel.base_url = base_url;
            }
            if let Some(channel_api_key_value) = channel.api_key {
                self.channel.api_key = secret_value(channel_api_key_value);
            }
            if let Some(instance) = channel.instance {
                self.channel.instance = instance;
            }
            if let Some(owner_identity) = channel.owner_identity {
                self.channel.owner_identity = owner_identity;
            }
            if let Some(timeout_secs) = channel.timeout_secs {
                self.channel.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pacing) = patch.pacing {
            if let Some(enabled) = pacing.enabled {
                self.pacing.enabled = enabled;
            }
            if let Some(presence) = pacing.presence {
                self.pacing.presence = presence;
            }
            if let Some(typing) = pacing.typing {
                self.pacing.typing = typing;
            }
            if let Some(min_base_ms) = pacing.min_base_ms {
                self.pacing.min_base_ms = min_base_ms;
            }
            if let Some(max_base_ms) = pacing.max_base_ms {
                self.pacing.max_base_ms = max_base_ms;
            }
            if let Some(min_char_ms) = pacing.min_char_ms {
                self.pacing.min_char_ms = min_char_ms;
            }
            if let Some(max_char_ms) = pacing.max_char_ms {
                self.pacing.max_char_ms = max_char_ms;
            }
            if let Some(max_delay_ms) = pacing.max_delay_ms {
                self.pacing.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
            if let Some(base_price) = pricing.base_price {
                self.pricing.base_price = base_price;
            }
            if let Some(upsell_price) = pricing.upsell_price {
                self.pricing.upsell_price = upsell_price;
            }
            if let Some(discounts) = pricing.discounts {
                self.pricing.discounts = discounts;
            }
        }

        if let Some(offer) = patch.offer {
            if let Some(product_name) = offer.product_name {
                self.offer.product_name = product_name;
            }
            if let Some(product_description) = offer.product_description {
                self.offer.product_description = product_description;
            }
            if let Some(lead_magnet_name) = offer.lead_magnet_name {
                self.offer.lead_magnet_name = lead_magnet_name;
            }
            if let Some(lead_magnet_url) = offer.lead_magnet_url {
                self.offer.lead_magnet_url = lead_magnet_url;
            }
            if let Some(delivery_url) = offer.delivery_url {
                self.offer.delivery_url = delivery_url;
            }
            if let Some(upsell_name) = offer.upsell_name {
                self.offer.upsell_name = upsell_name;
            }
            if let Some(upsell_delivery_url) = offer.upsell_delivery_url {
                self.offer.upsell_delivery_url = upsell_delivery_url;
            }
            if let Some(payment_link) = offer.payment_link {
                self.offer.payment_link = payment_link;
            }
            if let Some(bank) = offer.bank {
                if let Some(name) = bank.name {
                    self.offer.bank.name = name;
                }
                if let Some(holder) = bank.holder {
                    self.offer.bank.holder = holder;
                }
                if let Some(account_number) = bank.account_number {
                    self.offer.bank.account_number = account_number;
                }
                if let Some(account_type) = bank.account_type {
                    self.offer.bank.account_type = account_type;
                }
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("EMBUDO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("EMBUDO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("EMBUDO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("EMBUDO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("EMBUDO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EMBUDO_CHANNEL_BASE_URL") {
            self.channel.base_url = value;
        }
        if let Some(value) = read_env("EMBUDO_CHANNEL_API_KEY") {
            self.channel.api_key = secret_value(value);
        }
        if let Some(value) = read_env("EMBUDO_CHANNEL_INSTANCE") {
            self.channel.instance = value;
        }
        if let Some(value) = read_env("EMBUDO_CHANNEL_OWNER_IDENTITY") {
            self.channel.owner_identity = value;
        }
        if let Some(value) = read_env("EMBUDO_CHANNEL_TIMEOUT_SECS") {
            self.channel.timeout_secs = parse_u64("EMBUDO_CHANNEL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EMBUDO_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("EMBUDO_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("EMBUDO_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("EMBUDO_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("EMBUDO_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("EMBUDO_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("EMBUDO_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("EMBUDO_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("EMBUDO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("EMBUDO_SERVER_PORT") {
            self.server.port = parse_u16("EMBUDO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("EMBUDO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("EMBUDO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("EMBUDO_PACING_ENABLED") {
            self.pacing.enabled = parse_bool("EMBUDO_PACING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("EMBUDO_PACING_MAX_DELAY_MS") {
            self.pacing.max_delay_ms = parse_u64("EMBUDO_PACING_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("EMBUDO_PRICING_BASE_PRICE") {
            self.pricing.base_price = parse_decimal("EMBUDO_PRICING_BASE_PRICE", &value)?;
        }
        if let Some(value) = read_env("EMBUDO_PRICING_UPSELL_PRICE") {
            self.pricing.upsell_price = parse_decimal("EMBUDO_PRICING_UPSELL_PRICE", &value)?;
        }

        let log_level = read_env("EMBUDO_LOGGING_LEVEL").or_else(|| read_env("EMBUDO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("EMBUDO_LOGGING_FORMAT").or_else(|| read_env("EMBUDO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(channel_base_url) = overrides.channel_base_url {
            self.channel.base_url = channel_base_url;
        }
        if let Some(channel_api_key) = overrides.channel_api_key {
            self.channel.api_key = secret_value(channel_api_key);
        }
        if let Some(owner_identity) = overrides.owner_identity {
            self.channel.owner_identity = owner_identity;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_channel(&self.channel)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_pacing(&self.pacing)?;
        validate_pricing(&self.pricing)?;
        validate_offer(&self.offer)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("embudo.toml"), PathBuf::from("config/embudo.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ConfigError> {
    let base_url = channel.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "channel.base_url must start with http:// or https://".to_string(),
        ));
    }

    if channel.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "channel.api_key is required (the Evolution API key for the instance)".to_string(),
        ));
    }

    if channel.instance.trim().is_empty() {
        return Err(ConfigError::Validation("channel.instance must not be empty".to_string()));
    }

    if channel.owner_identity.trim().is_empty() {
        return Err(ConfigError::Validation(
            "channel.owner_identity is required (operator notifications have no recipient)"
                .to_string(),
        ));
    }

    if channel.timeout_secs == 0 || channel.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "channel.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    // A missing key is a valid deployment: the classifier stays disabled and
    // ambiguous turns take the deterministic stage defaults. A key that is set
    // but blank is a configuration mistake.
    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key must not be empty when set".to_string(),
            ));
        }
    }

    if llm.provider == LlmProvider::Ollama {
        let missing = llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.base_url is required for ollama provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pacing(pacing: &PacingConfig) -> Result<(), ConfigError> {
    if pacing.max_base_ms < pacing.min_base_ms {
        return Err(ConfigError::Validation(
            "pacing.max_base_ms must be >= pacing.min_base_ms".to_string(),
        ));
    }

    if pacing.max_char_ms < pacing.min_char_ms {
        return Err(ConfigError::Validation(
            "pacing.max_char_ms must be >= pacing.min_char_ms".to_string(),
        ));
    }

    if pacing.max_delay_ms < pacing.max_base_ms {
        return Err(ConfigError::Validation(
            "pacing.max_delay_ms must be >= pacing.max_base_ms (the cap would always clip)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PriceBook) -> Result<(), ConfigError> {
    if pricing.currency.trim().is_empty() {
        return Err(ConfigError::Validation("pricing.currency must not be empty".to_string()));
    }

    if pricing.base_price <= Decimal::ZERO || pricing.upsell_price <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pricing.base_price and pricing.upsell_price must be positive".to_string(),
        ));
    }

    for (country, discount) in &pricing.discounts {
        if discount.base < Decimal::ZERO || discount.upsell < Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "pricing.discounts.{country} must not be negative"
            )));
        }
    }

    Ok(())
}

fn validate_offer(offer: &OfferConfig) -> Result<(), ConfigError> {
    if offer.product_name.trim().is_empty() {
        return Err(ConfigError::Validation("offer.product_name must not be empty".to_string()));
    }

    if offer.delivery_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "offer.delivery_url is required (there is nothing to deliver without it)".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channel: Option<ChannelPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    pacing: Option<PacingPatch>,
    pricing: Option<PricingPatch>,
    offer: Option<OfferPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    instance: Option<String>,
    owner_identity: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PacingPatch {
    enabled: Option<bool>,
    presence: Option<bool>,
    typing: Option<bool>,
    min_base_ms: Option<u64>,
    max_base_ms: Option<u64>,
    min_char_ms: Option<u64>,
    max_char_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    currency: Option<String>,
    base_price: Option<Decimal>,
    upsell_price: Option<Decimal>,
    discounts: Option<BTreeMap<String, CountryDiscount>>,
}

#[derive(Debug, Default, Deserialize)]
struct OfferPatch {
    product_name: Option<String>,
    product_description: Option<String>,
    lead_magnet_name: Option<String>,
    lead_magnet_url: Option<String>,
    delivery_url: Option<String>,
    upsell_name: Option<String>,
    upsell_delivery_url: Option<String>,
    payment_link: Option<String>,
    bank: Option<BankPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BankPatch {
    name: Option<String>,
    holder: Option<String>,
    account_number: Option<String>,
    account_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const EMBUDO_VARS: &[&str] = &[
        "EMBUDO_DATABASE_URL",
        "EMBUDO_CHANNEL_API_KEY",
        "EMBUDO_CHANNEL_BASE_URL",
        "EMBUDO_CHANNEL_OWNER_IDENTITY",
        "EMBUDO_LLM_PROVIDER",
        "EMBUDO_LLM_API_KEY",
        "EMBUDO_LLM_BASE_URL",
        "EMBUDO_LOGGING_LEVEL",
        "EMBUDO_LOGGING_FORMAT",
        "EMBUDO_PRICING_BASE_PRICE",
        "EMBUDO_SERVER_PORT",
    ];

    fn clear_vars() {
        for var in EMBUDO_VARS {
            env::remove_var(var);
        }
    }

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            channel_api_key: Some("test-key".to_string()),
            llm_provider: Some(super::LlmProvider::Ollama),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_load_with_minimal_overrides() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();
        env::set_var("EMBUDO_LLM_BASE_URL", "http://localhost:11434");

        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("defaults should validate");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.pricing.base_price, Decimal::new(799, 2));
        assert_eq!(config.pricing.upsell_price, Decimal::new(1499, 2));
        assert_eq!(config.offer.bank.name, "Banco Pichincha");
        assert_eq!(config.pacing.max_delay_ms, 10_000);
        assert_eq!(config.logging.format, LogFormat::Compact);
        clear_vars();
    }

    #[test]
    fn missing_channel_api_key_fails_validation() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();

        let result = AppConfig::load(LoadOptions::default());
        match result {
            Err(ConfigError::Validation(message)) => {
                assert!(message.contains("api_key"), "unexpected message: {message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides_take_effect() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();
        env::set_var("EMBUDO_DATABASE_URL", "sqlite://envdb.db");
        env::set_var("EMBUDO_CHANNEL_API_KEY", "env-key");
        env::set_var("EMBUDO_LLM_PROVIDER", "ollama");
        env::set_var("EMBUDO_LLM_BASE_URL", "http://localhost:11434");
        env::set_var("EMBUDO_PRICING_BASE_PRICE", "9.49");
        env::set_var("EMBUDO_LOGGING_FORMAT", "json");

        let config = AppConfig::load(LoadOptions::default()).expect("env config should load");

        assert_eq!(config.database.url, "sqlite://envdb.db");
        assert_eq!(config.channel.api_key.expose_secret(), "env-key");
        assert_eq!(config.pricing.base_price, Decimal::new(949, 2));
        assert_eq!(config.logging.format, LogFormat::Json);
        clear_vars();
    }

    #[test]
    fn invalid_env_number_is_reported_with_the_key() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();
        env::set_var("EMBUDO_SERVER_PORT", "not-a-port");

        let result = AppConfig::load(LoadOptions::default());
        match result {
            Err(ConfigError::InvalidEnvOverride { key, value }) => {
                assert_eq!(key, "EMBUDO_SERVER_PORT");
                assert_eq!(value, "not-a-port");
            }
            other => panic!("expected invalid override error, got {other:?}"),
        }
        clear_vars();
    }

    #[test]
    fn toml_patch_overrides_defaults_and_interpolates_env() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();
        env::set_var("EMBUDO_TEST_SECRET", "from-env");

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("embudo.toml");
        fs::write(
            &path,
            r#"
[channel]
api_key = "${EMBUDO_TEST_SECRET}"
instance = "ventas"

[pricing]
base_price = "9.99"

[pricing.discounts.Ecuador]
base = "2.00"
upsell = "3.00"

[offer]
product_name = "Guía de Prueba"

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(super::LlmProvider::Ollama),
                ..ConfigOverrides::default()
            },
        })
        .expect("patched config should load");

        assert_eq!(config.channel.api_key.expose_secret(), "from-env");
        assert_eq!(config.channel.instance, "ventas");
        assert_eq!(config.pricing.base_price, Decimal::new(999, 2));
        let ecuador = config.pricing.discounts.get("Ecuador").expect("discount entry");
        assert_eq!(ecuador.base, Decimal::new(200, 2));
        assert_eq!(config.offer.product_name, "Guía de Prueba");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);

        env::remove_var("EMBUDO_TEST_SECRET");
        clear_vars();
    }

    #[test]
    fn require_file_fails_when_the_path_is_missing() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();

        let result = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            overrides: valid_overrides(),
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn ollama_requires_a_base_url() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                channel_api_key: Some("test-key".to_string()),
                llm_provider: Some(super::LlmProvider::Ollama),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        match result {
            Err(ConfigError::Validation(message)) => {
                assert!(message.contains("llm.base_url"), "unexpected message: {message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn a_missing_llm_key_is_a_valid_deployment() {
        let _guard = env_lock().lock().unwrap();
        clear_vars();

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                channel_api_key: Some("test-key".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("keyless providers should validate, the classifier just stays off");

        assert_eq!(config.llm.provider, super::LlmProvider::Anthropic);
        assert!(config.llm.api_key.is_none());
    }
}
