//! Payment instructions and the waiting room in front of the verifier.
//!
//! Entering this stage arms `awaiting_proof` right away: the user is
//! looking at payment details, so any image from here on is treated as a
//! proof attempt. The final price is fixed on first entry and survives
//! for the rest of the funnel pass.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{ConversationState, FunnelStage, TemplateError};
use tera::Context;

use crate::intent::{self, CloserResponse};
use crate::stages::{country_label, display_name, uses_bank_transfer, StageHandler, StageReply, StageServices};

pub struct CloserStage {
    services: Arc<StageServices>,
}

impl CloserStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        CloserStage { services }
    }
}

#[async_trait]
impl StageHandler for CloserStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Closer
    }

    async fn start(&self, state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        let quote = self.services.pricing.base_quote(state.country.as_deref());
        // Computed once per funnel pass; only a restart clears it.
        if state.final_price.is_none() {
            state.final_price = Some(quote.final_price);
        }
        let final_price = state.final_price.unwrap_or(quote.final_price);

        state.awaiting_proof = true;
        state.set_sub_step("waiting_proof");

        let offer = &self.services.offer;
        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        ctx.insert("final_price", &final_price);

        let text = if uses_bank_transfer(state) {
            ctx.insert("country", country_label(state));
            ctx.insert("discount", &quote.discount);
            ctx.insert("discounted", &quote.discounted);
            ctx.insert("bank_name", &offer.bank.name);
            ctx.insert("bank_holder", &offer.bank.holder);
            ctx.insert("bank_account_type", &offer.bank.account_type);
            ctx.insert("bank_account_number", &offer.bank.account_number);
            self.services.catalog.render("closer_payment_bank", &ctx)?
        } else {
            ctx.insert("payment_link", &offer.payment_link);
            self.services.catalog.render("closer_payment_international", &ctx)?
        };

        Ok(StageReply::say(text))
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        let reply = match intent::closer_response(text) {
            CloserResponse::Question => {
                self.services.catalog.render("closer_question", &Context::new())?
            }
            CloserResponse::Confirm => {
                state.awaiting_proof = true;
                state.set_sub_step("waiting_proof");
                let mut ctx = Context::new();
                ctx.insert("name", &display_name(state));
                self.services.catalog.render("closer_waiting", &ctx)?
            }
            CloserResponse::Reconsider => {
                self.services.catalog.render("closer_reconsider", &Context::new())?
            }
            CloserResponse::Other => {
                self.services.catalog.render("closer_default", &Context::new())?
            }
        };
        Ok(StageReply::say(reply))
    }
}
