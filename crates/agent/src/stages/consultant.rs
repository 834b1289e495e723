//! Diagnose experience level, hand over the gift, pitch the product.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{country_flag, ConversationState, ExperienceLevel, FunnelStage, TemplateError};
use tera::Context;
use tracing::debug;

use crate::intent;
use crate::stages::{display_name, StageHandler, StageReply, StageServices};

pub struct ConsultantStage {
    services: Arc<StageServices>,
}

impl ConsultantStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        ConsultantStage { services }
    }

    fn level_text(level: ExperienceLevel) -> &'static str {
        match level {
            ExperienceLevel::Beginner => "novato/a",
            ExperienceLevel::Intermediate => "con experiencia",
            ExperienceLevel::Advanced => "avanzado/a",
        }
    }
}

#[async_trait]
impl StageHandler for ConsultantStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Consultant
    }

    async fn start(&self, state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        state.set_sub_step("asked_level");

        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        ctx.insert("flag", country_flag(state.country.as_deref().unwrap_or("")));
        ctx.insert("product_name", &self.services.offer.product_name);
        let text = self.services.catalog.render("consultant_level_question", &ctx)?;
        Ok(StageReply::say(text))
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        if !state.sub_step_is("asked_level") {
            // Level was never asked on this pass; ask instead of guessing.
            state.set_sub_step("asked_level");
            let text = self.services.catalog.render("consultant_reprompt", &Context::new())?;
            return Ok(StageReply::say(text));
        }

        let name = display_name(state);
        let level = match intent::match_experience(text) {
            Some(level) => {
                debug!(identity = %state.identity, level = level.as_str(), "local level match");
                level
            }
            None => self.services.classifier.classify_experience(text, &name).await,
        };
        state.experience = Some(level);

        let offer = &self.services.offer;
        let mut ctx = Context::new();
        ctx.insert("name", &name);
        ctx.insert("level", level.as_str());
        ctx.insert("level_text", Self::level_text(level));
        ctx.insert("lead_magnet_name", &offer.lead_magnet_name);
        ctx.insert("lead_magnet_url", &offer.lead_magnet_url);
        ctx.insert("product_name", &offer.product_name);
        ctx.insert("product_description", &offer.product_description);
        let gift = self.services.catalog.render("consultant_gift", &ctx)?;

        Ok(StageReply { messages: vec![gift], advance: Some(FunnelStage::Router), notify_operator: None })
    }
}
