//! First contact: learn who is writing and from where.
//!
//! Extraction runs on the very first message, so "Carlos, Ecuador" as an
//! opener skips the welcome question entirely. After one failed ask and
//! one failed retry the handler falls back to the first word of the
//! message as the name and "Unknown" as the country, guaranteeing the
//! funnel always moves forward.

use std::sync::Arc;

use async_trait::async_trait;
use embudo_core::{ConversationState, FunnelStage, TemplateError};
use tera::Context;
use tracing::debug;

use crate::intent;
use crate::stages::{StageHandler, StageReply, StageServices};

pub struct GreeterStage {
    services: Arc<StageServices>,
}

impl GreeterStage {
    pub fn new(services: Arc<StageServices>) -> Self {
        GreeterStage { services }
    }

    /// Folds whatever the message reveals into the state. Partial finds
    /// stick, so a country given on the ask turn survives into the retry
    /// turn. Returns whether both halves are now known.
    async fn absorb(
        &self,
        state: &mut ConversationState,
        text: &str,
        use_classifier: bool,
    ) -> bool {
        let (name, country) = match intent::extract_contact(text) {
            Some(contact) => (Some(contact.name), Some(contact.country)),
            None if use_classifier => self.services.classifier.parse_contact(text).await,
            None => (None, None),
        };

        if let Some(found) = name {
            state.display_name = Some(found);
        }
        if let Some(found) = country {
            let canonical = intent::canonical_country(&found)
                .map(str::to_string)
                .unwrap_or(found);
            state.country = Some(canonical);
        }

        state.display_name.is_some() && state.country.is_some()
    }

    fn hand_to_consultant(&self, state: &ConversationState) -> StageReply {
        debug!(
            identity = %state.identity,
            name = state.display_name.as_deref().unwrap_or(""),
            country = state.country.as_deref().unwrap_or(""),
            "contact captured"
        );
        StageReply::advance_to(FunnelStage::Consultant)
    }
}

#[async_trait]
impl StageHandler for GreeterStage {
    fn stage(&self) -> FunnelStage {
        FunnelStage::Greeter
    }

    async fn start(&self, state: &mut ConversationState) -> Result<StageReply, TemplateError> {
        state.set_sub_step("asked_name");
        let text = self.services.catalog.render("greeter_welcome", &Context::new())?;
        Ok(StageReply::say(text))
    }

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError> {
        match state.sub_step.as_deref() {
            Some("asked_name") => {
                if self.absorb(state, text, true).await {
                    return Ok(self.hand_to_consultant(state));
                }
                state.set_sub_step("retry");
                let text = self.services.catalog.render("greeter_retry", &Context::new())?;
                Ok(StageReply::say(text))
            }
            Some("retry") => {
                if !self.absorb(state, text, true).await {
                    // Third miss: take what we can and keep moving.
                    if state.display_name.is_none() {
                        state.display_name = Some(intent::fallback_name(text));
                    }
                    if state.country.is_none() {
                        state.country = Some("Unknown".to_string());
                    }
                }
                Ok(self.hand_to_consultant(state))
            }
            // First contact; the local tables alone decide whether the
            // opener already carries a usable name and country.
            _ => {
                if self.absorb(state, text, false).await {
                    return Ok(self.hand_to_consultant(state));
                }
                self.start(state).await
            }
        }
    }
}
