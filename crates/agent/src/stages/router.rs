//! Purchase-intent crossroads. Purchases move to the closer; info and
//! objections are answered in place; anything unreadable re-prompts the
//! menu. No state beyond the stage transition is touched here.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{country_flag, ConversationState, FunnelStage, TemplateError};
use tera::Context;
use tracing::debug;

use crate::intent::{self, ObjectionKind, RouteIntent};
use crate::stages::{country_label, display_name, StageHandler, StageReply, StageServices};

pub struct RouterStage {
    services: Arc<StageServices>,
}

impl RouterStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        RouterStage { services }
    }

    fn info_reply(&self, state: &ConversationState) -> Result<StageReply, TemplateError> {
        let offer = &self.services.offer;
        let quote = self.services.pricing.base_quote(state.country.as_deref());
        let country = country_label(state);

        let mut ctx = Context::new();
        ctx.insert("product_name", &offer.product_name);
        ctx.insert("product_description", &offer.product_description);
        ctx.insert("list_price", &quote.list_price);
        ctx.insert("final_price", &quote.final_price);
        ctx.insert("discounted", &quote.discounted);
        ctx.insert("country", country);
        ctx.insert("flag", country_flag(country));
        Ok(StageReply::say(self.services.catalog.render("router_info", &ctx)?))
    }

    fn objection_reply(
        &self,
        state: &ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        let quote = self.services.pricing.base_quote(state.country.as_deref());
        let country = country_label(state);

        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        let template = match intent::objection_kind(text) {
            ObjectionKind::Price => {
                ctx.insert("list_price", &quote.list_price);
                ctx.insert("final_price", &quote.final_price);
                ctx.insert("discounted", &quote.discounted);
                ctx.insert("country", country);
                ctx.insert("flag", country_flag(country));
                "router_objection_price"
            }
            ObjectionKind::Timing => "router_objection_timing",
            ObjectionKind::General => "router_objection_general",
        };
        Ok(StageReply::say(self.services.catalog.render(template, &ctx)?))
    }
}

#[async_trait]
impl StageHandler for RouterStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Router
    }

    // The consultant's gift message already ends in the routing question,
    // so entering this stage says nothing new.
    async fn start(&self, _state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        Ok(StageReply::default())
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        let name = display_name(state);
        let intent = match intent::match_route(text) {
            Some(local) => {
                debug!(identity = %state.identity, intent = local.as_str(), "local route match");
                local
            }
            None => {
                let level = state.experience.map(|l| l.as_str()).unwrap_or("beginner");
                let context = format!("Usuario de nivel {level}");
                let classified =
                    self.services.classifier.classify_route(text, &name, &context).await;
                debug!(identity = %state.identity, intent = classified.as_str(), "ai route");
                classified
            }
        };

        match intent {
            RouteIntent::Purchase => Ok(StageReply::advance_to(FunnelStage::Closer)),
            RouteIntent::Info => self.info_reply(state),
            RouteIntent::Objection => self.objection_reply(state, text),
            RouteIntent::Unclear => {
                let text = self.services.catalog.render("router_menu", &Context::new())?;
                Ok(StageReply::say(text))
            }
        }
    }
}
