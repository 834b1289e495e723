//! End-to-end funnel runs against the in-memory store.
//!
//! These tests drive the engine exactly the way the webhook route does:
//! inbound messages in, recorded outbound replies and operator
//! notifications out, with no LLM configured so every ambiguous turn
//! exercises the deterministic defaults.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use embudo_agent::classifier::ClassifierGateway;
use embudo_agent::engine::{EngineError, FunnelEngine};
use embudo_agent::llm::NoopLlmClient;
use embudo_agent::stages::StageServices;
use embudo_core::{
    ExperienceLevel, FunnelStage, InboundMessage, MessageCatalog, OfferConfig, PriceBook,
    ReplySender, SendError,
};
use embudo_db::{ConversationStore, InMemoryConversationStore};
use serde_json::json;

const OWNER: &str = "593000000000@s.whatsapp.net";
const CARLOS: &str = "593999000001@s.whatsapp.net";

/// Captures everything the engine tries to send, split by path.
#[derive(Default)]
struct RecordingSender {
    replies: Mutex<Vec<(String, String)>>,
    directs: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn replies_to(&self, identity: &str) -> Vec<String> {
        self.replies
            .lock()
            .expect("replies lock")
            .iter()
            .filter(|(to, _)| to == identity)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn directs_to(&self, identity: &str) -> Vec<String> {
        self.directs
            .lock()
            .expect("directs lock")
            .iter()
            .filter(|(to, _)| to == identity)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn last_reply(&self, identity: &str) -> String {
        self.replies_to(identity).last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ReplySender for RecordingSender {
    async fn send_reply(&self, identity: &str, text: &str) -> Result<(), SendError> {
        self.replies
            .lock()
            .expect("replies lock")
            .push((identity.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_direct(&self, identity: &str, text: &str) -> Result<(), SendError> {
        self.directs
            .lock()
            .expect("directs lock")
            .push((identity.to_string(), text.to_string()));
        Ok(())
    }
}

fn engine() -> (FunnelEngine, Arc<RecordingSender>, Arc<InMemoryConversationStore>) {
    let services = Arc::new(StageServices {
        catalog: MessageCatalog::new().expect("catalog builds"),
        pricing: PriceBook::default(),
        offer: OfferConfig::default(),
        classifier: ClassifierGateway::new(Arc::new(NoopLlmClient)),
    });
    let store = Arc::new(InMemoryConversationStore::default());
    let sender = Arc::new(RecordingSender::default());
    let engine = FunnelEngine::new(
        services,
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::clone(&sender) as Arc<dyn ReplySender>,
        OWNER,
    );
    (engine, sender, store)
}

async fn say(engine: &FunnelEngine, identity: &str, text: &str) {
    engine
        .handle_message(InboundMessage::text(identity, text))
        .await
        .expect("message handled");
}

#[tokio::test]
async fn ecuador_buyer_walks_the_whole_funnel() {
    let (engine, sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    assert!(sender.last_reply(CARLOS).contains("¿Cómo te llamas"));

    say(&engine, CARLOS, "Carlos, Ecuador").await;
    let level_question = sender.last_reply(CARLOS);
    assert!(level_question.contains("Carlos"), "greeting misses the name: {level_question}");
    assert!(level_question.contains("\u{1F1EA}\u{1F1E8}"), "missing flag: {level_question}");

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Consultant);
    assert_eq!(state.display_name.as_deref(), Some("Carlos"));
    assert_eq!(state.country.as_deref(), Some("Ecuador"));

    say(&engine, CARLOS, "1").await;
    let gift = sender.last_reply(CARLOS);
    assert!(gift.contains("principiante"), "beginner branch missing: {gift}");
    assert!(gift.contains("Cursos Gratis"), "lead magnet missing: {gift}");

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Router);
    assert_eq!(state.experience, Some(ExperienceLevel::Beginner));

    say(&engine, CARLOS, "quiero comprarlo").await;
    let payment = sender.last_reply(CARLOS);
    assert!(payment.contains("transferencia bancaria"), "bank path missing: {payment}");
    assert!(payment.contains("*$6.99*"), "discounted price missing: {payment}");
    assert!(payment.contains("Banco Pichincha"));

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Closer);
    assert!(state.awaiting_proof);
    assert!(state.final_price.is_some());

    engine
        .handle_message(InboundMessage::image(CARLOS, json!({"url": "https://img/proof.jpg"})))
        .await
        .expect("proof handled");
    assert!(sender.last_reply(CARLOS).contains("He recibido tu comprobante"));

    // The proof never advances the funnel by itself.
    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Closer);
    assert!(state.proof_received);
    assert!(!state.payment_confirmed);

    let alerts = sender.directs_to(OWNER);
    assert_eq!(alerts.len(), 1, "exactly one pending-payment alert: {alerts:?}");
    assert!(alerts[0].contains("NUEVO PAGO PENDIENTE"));
    assert!(alerts[0].contains(CARLOS));

    engine.confirm_payment(CARLOS, Some("Carlos Pérez")).await.expect("confirmed");
    let delivery = sender.last_reply(CARLOS);
    assert!(delivery.contains("CONFIRMADO"), "delivery missing: {delivery}");
    assert!(delivery.contains("drive.google.com"), "delivery url missing: {delivery}");
    assert!(delivery.contains("$12.99"), "upsell offer missing: {delivery}");

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Upsell);
    assert_eq!(state.display_name.as_deref(), Some("Carlos Pérez"));
    assert!(state.payment_confirmed);
    assert!(state.product_delivered);
    assert!(!state.awaiting_proof);

    // A duplicated confirmation must not deliver twice.
    let dup = engine.confirm_payment(CARLOS, None).await;
    assert!(matches!(dup, Err(EngineError::NotAwaitingProof(_))), "got {dup:?}");

    say(&engine, CARLOS, "1").await;
    let upsell = sender.last_reply(CARLOS);
    assert!(upsell.contains("¡Excelente decisión"), "upsell accept missing: {upsell}");
    assert!(upsell.contains("$12.99"));

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Completed);

    say(&engine, CARLOS, "gracias por todo").await;
    assert!(sender.last_reply(CARLOS).contains("Tu compra ya está completa"));

    // Delivery implies confirmation, always.
    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert!(!state.product_delivered || state.payment_confirmed);
    assert_eq!(state.message_count, 7, "six texts plus the proof image");
}

#[tokio::test]
async fn stray_images_are_rejected_without_creating_state() {
    let (engine, sender, store) = engine();

    for _ in 0..2 {
        engine
            .handle_message(InboundMessage::image(CARLOS, json!({"url": "https://img/x.jpg"})))
            .await
            .expect("rejection is not an error");
        assert!(sender.last_reply(CARLOS).contains("no estoy esperando un comprobante"));
        assert!(store.find(CARLOS).await.expect("find").is_none(), "rejection must not persist");
    }
}

#[tokio::test]
async fn images_before_the_closer_leave_the_conversation_untouched() {
    let (engine, sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    let before = store.find(CARLOS).await.expect("find").expect("record");

    engine
        .handle_message(InboundMessage::image(CARLOS, json!({"url": "https://img/x.jpg"})))
        .await
        .expect("rejection is not an error");
    assert!(sender.last_reply(CARLOS).contains("no estoy esperando un comprobante"));

    let after = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(after.message_count, before.message_count);
    assert_eq!(after.stage, FunnelStage::Greeter);
    assert!(!after.proof_received);
}

#[tokio::test]
async fn greeter_gives_up_after_two_misses_and_keeps_moving() {
    let (engine, sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    say(&engine, CARLOS, "por qué quieres saber eso").await;
    assert!(sender.last_reply(CARLOS).contains("¿Me repites tu nombre"));

    say(&engine, CARLOS, "juan").await;
    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Consultant);
    assert_eq!(state.display_name.as_deref(), Some("Juan"));
    assert_eq!(state.country.as_deref(), Some("Unknown"));
    // Unknown origin renders the globe, not a flag.
    assert!(sender.last_reply(CARLOS).contains('\u{1F30D}'));
}

#[tokio::test]
async fn unreadable_level_answers_default_to_beginner() {
    let (engine, sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    say(&engine, CARLOS, "Ana, Colombia").await;
    // No keyword hit, and the Noop LLM always fails: safest level wins.
    say(&engine, CARLOS, "mmmmm").await;

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Router);
    assert_eq!(state.experience, Some(ExperienceLevel::Beginner));
    assert!(sender.last_reply(CARLOS).contains("principiante"));
}

#[tokio::test]
async fn restart_returns_to_greeter_but_keeps_the_purchase() {
    let (engine, sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    say(&engine, CARLOS, "Carlos, Ecuador").await;
    say(&engine, CARLOS, "1").await;
    say(&engine, CARLOS, "quiero comprarlo").await;
    engine
        .handle_message(InboundMessage::image(CARLOS, json!({"url": "https://img/proof.jpg"})))
        .await
        .expect("proof handled");
    engine.confirm_payment(CARLOS, None).await.expect("confirmed");

    say(&engine, CARLOS, "reiniciar").await;
    assert!(sender.last_reply(CARLOS).contains("¿Cómo te llamas"));

    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.stage, FunnelStage::Greeter);
    assert!(state.display_name.is_none());
    assert!(state.payment_confirmed, "restart must not refund");
    assert!(state.product_delivered);
}

#[tokio::test]
async fn concurrent_messages_from_one_identity_serialize() {
    let (engine, _sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    let (a, b) = tokio::join!(
        engine.handle_message(InboundMessage::text(CARLOS, "Carlos, Ecuador")),
        engine.handle_message(InboundMessage::text(CARLOS, "1")),
    );
    a.expect("first concurrent message");
    b.expect("second concurrent message");

    // Lost updates would leave the count at 2.
    let state = store.find(CARLOS).await.expect("find").expect("record");
    assert_eq!(state.message_count, 3);
}

#[tokio::test]
async fn confirming_an_unknown_identity_is_an_error() {
    let (engine, _sender, _store) = engine();
    let result = engine.confirm_payment("ghost@s.whatsapp.net", None).await;
    assert!(matches!(result, Err(EngineError::UnknownConversation(_))), "got {result:?}");
}

#[tokio::test]
async fn purge_forgets_the_conversation() {
    let (engine, _sender, store) = engine();

    say(&engine, CARLOS, "Hola").await;
    assert!(engine.purge_conversation(CARLOS).await.expect("purge"));
    assert!(store.find(CARLOS).await.expect("find").is_none());
    assert!(!engine.purge_conversation(CARLOS).await.expect("second purge"));
}

#[tokio::test]
async fn manual_sends_bypass_the_funnel() {
    let (engine, sender, store) = engine();

    engine.send_manual(CARLOS, "Hola, te escribo yo directamente").await.expect("manual send");
    assert_eq!(sender.directs_to(CARLOS), vec!["Hola, te escribo yo directamente".to_string()]);
    // No funnel turn ran, so no state either.
    assert!(store.find(CARLOS).await.expect("find").is_none());
}
