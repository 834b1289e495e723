//! Maps the current stage onto its handler and applies transitions.
//!
//! A handler asks for a transition by setting `advance` on its reply; the
//! dispatcher validates funnel order, enters the stage, and chains the
//! new stage's entry prompt onto the same outgoing reply so the user sees
//! one continuous exchange.

use std::collections::HashMap;
use std::sync::Arc;

use embudo_core::{ConversationState, FunnelStage, TemplateError};
use tracing::warn;

use crate::stages::{
    CloserStage, CompletedStage, ConsultantStage, GreeterStage, RouterStage, StageHandler,
    StageReply, StageServices, UpsellStage, VerifierStage,
};

pub struct StageDispatcher {
    handlers: HashMap<FunnelStage, Box<dyn StageHandler>>,
    /// Conversations in a stage with no registered handler re-enter at the
    /// top instead of erroring out.
    fallback: Box<dyn StageHandler>,
}

impl StageDispatcher {
    pub fn new(services: Arc<StageServices>) -> Self {
        let handlers: Vec<Box<dyn StageHandler>> = vec![
            Box::new(GreeterStage::new(Arc::clone(&services))),
            Box::new(ConsultantStage::new(Arc::clone(&services))),
            Box::new(RouterStage::new(Arc::clone(&services))),
            Box::new(CloserStage::new(Arc::clone(&services))),
            Box::new(VerifierStage::new(Arc::clone(&services))),
            Box::new(UpsellStage::new(Arc::clone(&services))),
            Box::new(CompletedStage::new(Arc::clone(&services))),
        ];
        let handlers = handlers.into_iter().map(|handler| (handler.stage(), handler)).collect();

        StageDispatcher { handlers, fallback: Box::new(GreeterStage::new(services)) }
    }

    /// Runs the owning handler, then applies at most one stage transition.
    pub async fn dispatch(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        let handler = self.handler_for(state.stage);
        let mut reply = handler.process(state, text).await?;

        if let Some(next) = reply.advance.take() {
            if state.stage.can_advance_to(next) {
                state.enter_stage(next);
                let mut entry = self.handler_for(next).start(state).await?;
                reply.messages.append(&mut entry.messages);
                if reply.notify_operator.is_none() {
                    reply.notify_operator = entry.notify_operator.take();
                }
            } else {
                warn!(
                    from = state.stage.as_str(),
                    to = next.as_str(),
                    "handler requested a funnel regression, ignoring"
                );
            }
        }

        Ok(reply)
    }

    /// Entry prompt of the state's current stage, used for restarts.
    pub async fn start_current(
        &self,
        state: &mut ConversationState,
    ) -> Result<StageReply, TemplateError> {
        self.handler_for(state.stage).start(state).await
    }

    fn handler_for(&self, stage: FunnelStage) -> &dyn StageHandler {
        self.handlers
            .get(&stage)
            .map(|handler| handler.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}
