//! Terminal stage. Purchases are done; late messages get a thank-you and
//! an offer of support with the material.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{ConversationState, FunnelStage, TemplateError};
use tera::Context;

use crate::stages::{StageHandler, StageReply, StageServices};

pub struct CompletedStage {
    services: Arc<StageServices>,
}

impl CompletedStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        CompletedStage { services }
    }
}

#[async_trait]
impl StageHandler for CompletedStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Completed
    }

    async fn start(&self, _state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        Ok(StageReply::default())
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        _text: &str,
    ) -> Result<StageReply, TemplateError> {
        let mut ctx = Context::new();
        if let Some(name) = &state.display_name {
            ctx.insert("name", name);
        }
        Ok(StageReply::say(self.services.catalog.render("completed_ack", &ctx)?))
    }
}
