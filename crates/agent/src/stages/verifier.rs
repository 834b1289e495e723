//! Payment verification. Proofs come in as images on a side channel, a
//! human checks the bank account, and an administrative call releases the
//! product. This stage is therefore mostly invoked off the
//! `awaiting_proof` flag rather than through normal text dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{ConversationState, FunnelStage, TemplateError};
use serde_json::Value;
use tera::Context;
use tracing::info;

use crate::stages::{country_label, display_name, StageHandler, StageReply, StageServices};

pub struct VerifierStage {
    services: Arc<StageServices>,
}

impl VerifierStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        VerifierStage { services }
    }

    /// Image received while `awaiting_proof`. Stores the payload, thanks
    /// the user, and drafts the operator alert. The stage is left alone;
    /// delivery waits for the manual confirmation call.
    pub async fn receive_proof(
        &self,
        state: &mut ConversationState,
        payload: Value,
    ) -> Result<StageReply, TemplateError> {
        state.store_proof(payload);

        let quote = self.services.pricing.base_quote(state.country.as_deref());
        let amount = state.final_price.unwrap_or(quote.final_price);

        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        ctx.insert("country", country_label(state));
        ctx.insert("identity", &state.identity);
        ctx.insert("phone", &state.identity);
        ctx.insert("amount", &amount);
        ctx.insert("bank_name", &self.services.offer.bank.name);

        let reply = self.services.catalog.render("verifier_proof_received", &ctx)?;
        let alert = self.services.catalog.render("operator_payment_pending", &ctx)?;

        info!(identity = %state.identity, "payment proof stored, operator alerted");
        Ok(StageReply { messages: vec![reply], advance: None, notify_operator: Some(alert) })
    }

    /// Delivery message plus upsell offer, rendered after the operator
    /// confirms the payment arrived.
    pub fn delivery_reply(&self, state: &ConversationState) -> Result<StageReply, TemplateError> {
        let offer = &self.services.offer;
        let upsell = self.services.pricing.upsell_quote(state.country.as_deref());

        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        ctx.insert("identity", &state.identity);
        ctx.insert("product_name", &offer.product_name);
        ctx.insert("delivery_url", &offer.delivery_url);
        ctx.insert("lead_magnet_name", &offer.lead_magnet_name);
        ctx.insert("upsell_name", &offer.upsell_name);
        ctx.insert("upsell_price", &upsell.final_price);

        let delivery = self.services.catalog.render("verifier_delivery", &ctx)?;
        let alert = self.services.catalog.render("operator_delivered", &ctx)?;

        Ok(StageReply { messages: vec![delivery], advance: None, notify_operator: Some(alert) })
    }
}

#[async_trait]
impl StageHandler for VerifierStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Verifier
    }

    async fn start(&self, state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("name", &display_name(state));
        Ok(StageReply::say(self.services.catalog.render("verifier_reviewing", &ctx)?))
    }

    // Text while a proof sits in review gets a patience note; there is
    // nothing for the user to decide until the operator confirms.
    async fn process(
        &self,
        state: &mut ConversationState,
        _text: &str,
    ) -> Result<StageReply, TemplateError> {
        self.start(state).await
    }
}
