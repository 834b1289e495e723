use std::collections::HashMap;

use tokio::sync::RwLock;

use embudo_core::domain::conversation::ConversationState;

use super::{ConversationStore, StoreError};

/// Map-backed store for tests and the smoke command. Ordering in `list`
/// matches the sqlite implementation.
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find(&self, identity: &str) -> Result<Option<ConversationState>, StoreError> {
        let states = self.states.read().await;
        Ok(states.get(identity).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let mut states = self.states.write().await;
        states.insert(state.identity.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<bool, StoreError> {
        let mut states = self.states.write().await;
        Ok(states.remove(identity).is_some())
    }

    async fn list(&self) -> Result<Vec<ConversationState>, StoreError> {
        let states = self.states.read().await;
        let mut all: Vec<ConversationState> = states.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use embudo_core::domain::conversation::{ConversationState, FunnelStage};

    use super::InMemoryConversationStore;
    use crate::store::ConversationStore;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let store = InMemoryConversationStore::default();
        let mut state = ConversationState::new("593999000001@s.whatsapp.net");
        state.enter_stage(FunnelStage::Router);

        store.save(&state).await.expect("save");
        let loaded = store.find(&state.identity).await.expect("find").expect("record");
        assert_eq!(loaded.stage, FunnelStage::Router);

        assert!(store.delete(&state.identity).await.expect("delete"));
        assert!(!store.delete(&state.identity).await.expect("delete again"));
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let store = InMemoryConversationStore::default();
        let older = ConversationState::new("older@s.whatsapp.net");
        store.save(&older).await.expect("save older");

        let mut newer = ConversationState::new("newer@s.whatsapp.net");
        newer.touch();
        store.save(&newer).await.expect("save newer");

        let all = store.list().await.expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].identity, "newer@s.whatsapp.net");
    }
}
