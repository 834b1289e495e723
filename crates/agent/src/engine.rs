//! The funnel engine: everything between a parsed inbound event and a
//! rendered outbound reply.
//!
//! Responsibilities that deliberately live here and nowhere else:
//! per-identity serialization (two messages from the same person never
//! race), the image side-channel (proofs bypass text dispatch), restart
//! commands, the persist-exactly-once rule, and the administrative
//! payment confirmation, which takes the same lock as inbound traffic.

use std::collections::HashMap;
use std::sync::Arc;

use embudo_core::{
    ConversationState, FunnelStage, InboundMessage, MessageKind, ReplySender, SendError,
    TemplateError,
};
use embudo_db::{ConversationStore, StoreError};
use tera::Context;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::dispatcher::StageDispatcher;
use crate::intent;
use crate::stages::{StageServices, VerifierStage};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no conversation for identity `{0}`")]
    UnknownConversation(String),
    #[error("conversation `{0}` is not awaiting a payment proof")]
    NotAwaitingProof(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Send(#[from] SendError),
}

pub struct FunnelEngine {
    services: Arc<StageServices>,
    dispatcher: StageDispatcher,
    verifier: VerifierStage,
    store: Arc<dyn ConversationStore>,
    sender: Arc<dyn ReplySender>,
    owner_identity: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FunnelEngine {
    pub fn new(
        services: Arc<StageServices>,
        store: Arc<dyn ConversationStore>,
        sender: Arc<dyn ReplySender>,
        owner_identity: impl Into<String>,
    ) -> Self {
        FunnelEngine {
            dispatcher: StageDispatcher::new(Arc::clone(&services)),
            verifier: VerifierStage::new(Arc::clone(&services)),
            services,
            store,
            sender,
            owner_identity: owner_identity.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Processes one inbound message end to end: lock, load, dispatch,
    /// persist once, send. Nothing is written if the handler fails, and
    /// nothing is sent if the write fails.
    pub async fn handle_message(&self, message: InboundMessage) -> Result<(), EngineError> {
        if let MessageKind::Text { body } = &message.kind {
            if body.trim().is_empty() {
                return Ok(());
            }
        }

        let identity = message.identity.clone();
        let lock = self.session_lock(&identity).await;
        let _guard = lock.lock().await;

        let mut state = match self.store.find(&identity).await? {
            Some(state) => state,
            None => ConversationState::new(&identity),
        };

        let reply = match message.kind {
            MessageKind::Image { payload } => {
                if !state.awaiting_proof {
                    // Reject without touching state: safe to repeat forever.
                    let text = self
                        .services
                        .catalog
                        .render("verifier_rejected_image", &Context::new())?;
                    self.deliver(&identity, &[text], None).await;
                    return Ok(());
                }
                self.verifier.receive_proof(&mut state, payload).await?
            }
            MessageKind::Text { body } => {
                let text = body.trim();
                if intent::is_restart_request(text) {
                    info!(identity = %identity, "restart requested");
                    state.restart();
                    self.dispatcher.start_current(&mut state).await?
                } else {
                    self.dispatcher.dispatch(&mut state, text).await?
                }
            }
        };

        state.note_message();
        if let Err(store_error) = self.store.save(&state).await {
            error!(identity = %identity, error = %store_error, "persist failed, turn discarded");
            match self.services.catalog.render("generic_failure", &Context::new()) {
                Ok(text) => self.deliver(&identity, &[text], None).await,
                Err(render_error) => {
                    warn!(error = %render_error, "failure notice could not be rendered")
                }
            }
            return Err(EngineError::Store(store_error));
        }

        self.deliver(&identity, &reply.messages, reply.notify_operator.as_deref()).await;
        Ok(())
    }

    /// Operator confirmed the transfer arrived. Guarded by
    /// `awaiting_proof` so a duplicated confirmation cannot deliver twice.
    pub async fn confirm_payment(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<(), EngineError> {
        let lock = self.session_lock(identity).await;
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .find(identity)
            .await?
            .ok_or_else(|| EngineError::UnknownConversation(identity.to_string()))?;
        if !state.awaiting_proof {
            return Err(EngineError::NotAwaitingProof(identity.to_string()));
        }

        if let Some(name) = display_name {
            let name = name.trim();
            if !name.is_empty() {
                state.display_name = Some(name.to_string());
            }
        }

        state.mark_confirmed();
        state.enter_stage(FunnelStage::Upsell);
        state.touch();

        let reply = self.verifier.delivery_reply(&state)?;
        self.store.save(&state).await?;
        info!(identity = %identity, "payment confirmed, product delivered");

        self.deliver(identity, &reply.messages, reply.notify_operator.as_deref()).await;
        Ok(())
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationState>, EngineError> {
        Ok(self.store.list().await?)
    }

    pub async fn conversation(
        &self,
        identity: &str,
    ) -> Result<Option<ConversationState>, EngineError> {
        Ok(self.store.find(identity).await?)
    }

    /// Administrative purge. Returns whether a record existed.
    pub async fn purge_conversation(&self, identity: &str) -> Result<bool, EngineError> {
        let lock = self.session_lock(identity).await;
        let _guard = lock.lock().await;
        Ok(self.store.delete(identity).await?)
    }

    /// Manual out-of-band send, bypassing the funnel and its pacing.
    pub async fn send_manual(&self, identity: &str, text: &str) -> Result<(), EngineError> {
        self.sender.send_direct(identity, text).await?;
        Ok(())
    }

    async fn session_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(identity.to_string()).or_default())
    }

    /// Failures here are logged and absorbed: state is already durable,
    /// and the user can always write again.
    async fn deliver(&self, identity: &str, messages: &[String], notify: Option<&str>) {
        for text in messages {
            if let Err(send_error) = self.sender.send_reply(identity, text).await {
                warn!(identity = %identity, error = %send_error, "reply send failed");
            }
        }
        if let Some(note) = notify {
            if let Err(send_error) = self.sender.send_direct(&self.owner_identity, note).await {
                warn!(error = %send_error, "operator notification failed");
            }
        }
    }
}
