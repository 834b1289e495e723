use std::sync::Arc;

use embudo_agent::classifier::ClassifierGateway;
use embudo_agent::engine::FunnelEngine;
use embudo_agent::llm::{HttpLlmClient, LlmClient, NoopLlmClient};
use embudo_agent::stages::StageServices;
use embudo_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions};
use embudo_core::{MessageCatalog, TemplateError};
use embudo_db::{connect_with_settings, migrations, DbPool, SqliteConversationStore};
use embudo_whatsapp::{ChannelError, EvolutionClient, HumanizedSender};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<FunnelEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("channel client failed to initialize: {0}")]
    Channel(#[from] ChannelError),
    #[error("message catalog failed to build: {0}")]
    Catalog(#[from] TemplateError),
    #[error("llm client failed to initialize: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let store = Arc::new(SqliteConversationStore::new(db_pool.clone()));
    let transport = Arc::new(EvolutionClient::from_config(&config.channel)?);
    let sender = Arc::new(HumanizedSender::new(transport, config.pacing.clone()));
    let llm = build_llm_client(&config)?;

    let services = Arc::new(StageServices {
        catalog: MessageCatalog::new()?,
        pricing: config.pricing.clone(),
        offer: config.offer.clone(),
        classifier: ClassifierGateway::new(llm),
    });

    let engine = Arc::new(FunnelEngine::new(
        services,
        store,
        sender,
        config.channel.owner_identity.clone(),
    ));

    info!(
        event_name = "system.bootstrap.ready",
        owner = %config.channel.owner_identity,
        "funnel engine assembled"
    );

    Ok(Application { config, db_pool, engine })
}

/// Without credentials the funnel still runs; every ambiguous turn then
/// takes the deterministic fallback instead of a model call.
fn build_llm_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>, BootstrapError> {
    let needs_key = config.llm.provider != LlmProvider::Ollama;
    if needs_key && config.llm.api_key.is_none() {
        info!(
            event_name = "system.bootstrap.llm_disabled",
            provider = ?config.llm.provider,
            "no llm api key configured, classifier falls back to local matching"
        );
        return Ok(Arc::new(NoopLlmClient));
    }

    let client =
        HttpLlmClient::from_config(&config.llm).map_err(|e| BootstrapError::Llm(e.to_string()))?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "llm classifier configured"
    );
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use embudo_core::config::AppConfig;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_unreachable_database() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite:///nonexistent-dir/embudo.db".to_string();

        let error =
            bootstrap_with_config(config).await.err().expect("bootstrap must fail to connect");
        assert!(matches!(error, BootstrapError::DatabaseConnect(_)), "got {error:?}");
    }

    #[tokio::test]
    async fn bootstrap_smoke_prepares_schema_and_engine() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:?cache=shared".to_string();

        let app = bootstrap_with_config(config).await.expect("bootstrap succeeds");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name = 'conversation_state'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema check");
        assert_eq!(count, 1, "bootstrap should create the conversation table");

        let all = app.engine.conversations().await.expect("engine reaches the store");
        assert!(all.is_empty());

        app.db_pool.close().await;
    }
}
