use async_trait::async_trait;
use thiserror::Error;

use embudo_core::domain::conversation::ConversationState;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence port for the per-identity funnel record. `save` is a full
/// upsert of the aggregate; partial writes are not part of the contract.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find(&self, identity: &str) -> Result<Option<ConversationState>, StoreError>;

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Removes the record. Returns whether anything was there to remove.
    async fn delete(&self, identity: &str) -> Result<bool, StoreError>;

    /// All records, most recently updated first.
    async fn list(&self) -> Result<Vec<ConversationState>, StoreError>;
}
