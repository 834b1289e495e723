//! Post-purchase offer for the advanced course.
//!
//! Acceptance hands out payment details and closes the funnel; the actual
//! upsell payment is verified manually by the operator, so no proof flag
//! is armed here.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{ConversationState, FunnelStage, TemplateError};
use tera::Context;
use tracing::debug;

use crate::intent::{self, UpsellIntent};
use crate::stages::{country_label, display_name, uses_bank_transfer, StageHandler, StageReply, StageServices};

pub struct UpsellStage {
    services: Arc<StageServices>,
}

impl UpsellStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        UpsellStage { services }
    }

    fn accept_reply(&self, state: &ConversationState) -> Result<StageReply, TemplateError> {
        let offer = &self.services.offer;
        let quote = self.services.pricing.upsell_quote(state.country.as_deref());

        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        ctx.insert("price", &quote.final_price);

        let text = if uses_bank_transfer(state) {
            ctx.insert("country", country_label(state));
            ctx.insert("bank_name", &offer.bank.name);
            ctx.insert("bank_holder", &offer.bank.holder);
            ctx.insert("bank_account_type", &offer.bank.account_type);
            ctx.insert("bank_account_number", &offer.bank.account_number);
            self.services.catalog.render("upsell_payment_bank", &ctx)?
        } else {
            ctx.insert("payment_link", &offer.payment_link);
            self.services.catalog.render("upsell_payment_international", &ctx)?
        };

        Ok(StageReply {
            messages: vec![text],
            advance: Some(FunnelStage::Completed),
            notify_operator: None,
        })
    }
}

#[async_trait]
impl StageHandler for UpsellStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Upsell
    }

    // The delivery message that moved the conversation here already made
    // the offer; entry adds nothing.
    async fn start(&self, _state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        Ok(StageReply::default())
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        let name = display_name(state);
        let intent = match intent::match_upsell(text) {
            Some(local) => {
                debug!(identity = %state.identity, intent = local.as_str(), "local upsell match");
                local
            }
            None => self.services.classifier.classify_upsell(text, &name).await,
        };

        let offer = &self.services.offer;
        let quote = self.services.pricing.upsell_quote(state.country.as_deref());

        match intent {
            UpsellIntent::Accept => self.accept_reply(state),
            UpsellIntent::Reject => {
                let mut ctx = Context::new();
                ctx.insert("name", &name);
                let text = self.services.catalog.render("upsell_reject", &ctx)?;
                Ok(StageReply {
                    messages: vec![text],
                    advance: Some(FunnelStage::Completed),
                    notify_operator: None,
                })
            }
            UpsellIntent::Info => {
                let mut ctx = Context::new();
                ctx.insert("upsell_name", &offer.upsell_name);
                ctx.insert("price", &quote.final_price);
                Ok(StageReply::say(self.services.catalog.render("upsell_info", &ctx)?))
            }
            UpsellIntent::Unclear => {
                let mut ctx = Context::new();
                ctx.insert("upsell_name", &offer.upsell_name);
                ctx.insert("price", &quote.list_price);
                Ok(StageReply::say(self.services.catalog.render("upsell_menu", &ctx)?))
            }
        }
    }
}
