//! Stage handlers, one per funnel stage.
//!
//! A handler owns its stage's sub-steps and nothing else: it reads the
//! conversation, mutates it, and describes what should happen next via
//! [`StageReply`]. Persistence, sending, and locking stay in the engine.

mod closer;
mod completed;
mod consultant;
mod greeter;
mod router;
mod upsell;
mod verifier;

use async_trait::async_trait;
use embudo_core::config::OfferConfig;
use embudo_core::{ConversationState, FunnelStage, MessageCatalog, PriceBook, TemplateError};

pub use closer::CloserStage;
pub use completed::CompletedStage;
pub use consultant::ConsultantStage;
pub use greeter::GreeterStage;
pub use router::RouterStage;
pub use upsell::UpsellStage;
pub use verifier::VerifierStage;

use crate::classifier::ClassifierGateway;

/// Read-only services shared by every handler. Injected once at
/// construction so tests can substitute fixtures.
pub struct StageServices {
    pub catalog: MessageCatalog,
    pub pricing: PriceBook,
    pub offer: OfferConfig,
    pub classifier: ClassifierGateway,
}

/// Outcome of one handler invocation. `messages` go to the user in order,
/// `advance` is applied by the dispatcher (which then chains the next
/// stage's entry prompt), `notify_operator` goes to the owner identity
/// over the direct, unpaced path.
#[derive(Debug, Default)]
pub struct StageReply {
    pub messages: Vec<String>,
    pub advance: Option<FunnelStage>,
    pub notify_operator: Option<String>,
}

impl StageReply {
    pub fn say(text: String) -> Self {
        StageReply { messages: vec![text], ..StageReply::default() }
    }

    pub fn advance_to(stage: FunnelStage) -> Self {
        StageReply { advance: Some(stage), ..StageReply::default() }
    }
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> FunnelStage;

    /// Entry prompt, sent when the dispatcher moves a conversation into
    /// this stage. Must be idempotent at the same sub-step.
    async fn start(&self, state: &mut ConversationState) -> Result<StageReply, TemplateError>;

    async fn process(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<StageReply, TemplateError>;
}

pub(crate) fn display_name(state: &ConversationState) -> String {
    state.display_name.clone().unwrap_or_else(|| "Amigo/a".to_string())
}

pub(crate) fn country_label(state: &ConversationState) -> &str {
    state.country.as_deref().unwrap_or("Unknown")
}

/// Bank transfer is offered only where the configured account can receive
/// one; everyone else gets the international payment link.
pub(crate) fn uses_bank_transfer(state: &ConversationState) -> bool {
    state.country.as_deref().is_some_and(|country| country.eq_ignore_ascii_case("ecuador"))
}
