use crate::commands::CommandResult;
use embudo_core::config::{AppConfig, LoadOptions};
use embudo_db::{connect_with_settings, migrations, ConversationStore, SqliteConversationStore};

/// Deletes one identity's funnel state directly from the database. Works while
/// the server is down, which is exactly when operators tend to need it.
pub fn run(identity: &str) -> CommandResult {
    let identity = identity.trim();
    if identity.is_empty() {
        return CommandResult::failure(
            "purge",
            "invalid_identity",
            "identity must not be empty",
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "purge",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "purge",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        // A purge against a fresh database file should report "nothing stored"
        // rather than trip over a missing table.
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let store = SqliteConversationStore::new(pool.clone());
        let deleted = store
            .delete(identity)
            .await
            .map_err(|error| ("conversation_store", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<bool, (&'static str, String, u8)>(deleted)
    });

    match result {
        Ok(true) => {
            CommandResult::success("purge", format!("purged conversation state for `{identity}`"))
        }
        Ok(false) => CommandResult::success(
            "purge",
            format!("no conversation state stored for `{identity}`"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("purge", error_class, message, exit_code)
        }
    }
}
