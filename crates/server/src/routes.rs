//! HTTP surface of the funnel.
//!
//! Webhook:
//! - `POST /webhooks/evolution`: inbound WhatsApp deliveries
//!
//! Admin API:
//! - `GET    /api/conversations`: conversation summaries
//! - `GET    /api/conversations/{identity}`: one full conversation state
//! - `DELETE /api/conversations/{identity}`: purge a conversation
//! - `POST   /api/confirm-payment`: operator confirms a transfer
//! - `POST   /api/send-message`: manual out-of-band send
//!
//! Service:
//! - `GET /`: service banner
//! - `GET /health`: liveness plus database probe

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use embudo_agent::engine::{EngineError, FunnelEngine};
use embudo_core::ConversationState;
use embudo_db::DbPool;
use embudo_whatsapp::{parse_event, WebhookEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<FunnelEngine>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub identity: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub identity: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// Flat listing row; the full state is one more request away.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub identity: String,
    pub display_name: Option<String>,
    pub country: Option<String>,
    pub stage: &'static str,
    pub awaiting_proof: bool,
    pub payment_confirmed: bool,
    pub product_delivered: bool,
    pub message_count: i64,
    pub updated_at: String,
}

impl From<&ConversationState> for ConversationSummary {
    fn from(state: &ConversationState) -> Self {
        ConversationSummary {
            identity: state.identity.clone(),
            display_name: state.display_name.clone(),
            country: state.country.clone(),
            stage: state.stage.as_str(),
            awaiting_proof: state.awaiting_proof,
            payment_confirmed: state.payment_confirmed,
            product_delivered: state.product_delivered,
            message_count: state.message_count,
            updated_at: state.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub count: usize,
    pub conversations: Vec<ConversationSummary>,
}

pub fn router(engine: Arc<FunnelEngine>, db_pool: DbPool) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhooks/evolution", post(evolution_webhook))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{identity}", get(get_conversation).delete(delete_conversation))
        .route("/api/confirm-payment", post(confirm_payment))
        .route("/api/send-message", post(send_message))
        .with_state(ApiState { engine })
        .merge(health::router(db_pool))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "embudo-server is running",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
    }))
}

/// Every delivery is acknowledged with 200 unless processing itself fails;
/// retry storms from the gateway help nobody.
async fn evolution_webhook(
    State(state): State<ApiState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match parse_event(payload) {
        WebhookEvent::Ignored { reason } => {
            debug!(reason, "webhook delivery ignored");
            (StatusCode::OK, Json(json!({"status": "ignored", "reason": reason})))
        }
        WebhookEvent::Message(message) => {
            let identity = message.identity.clone();
            match state.engine.handle_message(message).await {
                Ok(()) => (StatusCode::OK, Json(json!({"status": "success"}))),
                Err(e) => {
                    error!(identity = %identity, error = %e, "webhook processing failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"status": "error", "detail": e.to_string()})),
                    )
                }
            }
        }
    }
}

async fn list_conversations(
    State(state): State<ApiState>,
) -> Result<Json<ConversationsResponse>, (StatusCode, Json<ApiError>)> {
    let conversations = state.engine.conversations().await.map_err(engine_error)?;
    let summaries: Vec<ConversationSummary> =
        conversations.iter().map(ConversationSummary::from).collect();
    Ok(Json(ConversationsResponse { count: summaries.len(), conversations: summaries }))
}

async fn get_conversation(
    Path(identity): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    match state.engine.conversation(&identity).await.map_err(engine_error)? {
        Some(conversation) => Ok(Json(json!({"conversation": conversation}))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: format!("no conversation for identity `{identity}`") }),
        )),
    }
}

async fn delete_conversation(
    Path(identity): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    let deleted = state.engine.purge_conversation(&identity).await.map_err(engine_error)?;
    Ok(Json(json!({"identity": identity, "deleted": deleted})))
}

async fn confirm_payment(
    State(state): State<ApiState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<ApiError>)> {
    state
        .engine
        .confirm_payment(&request.identity, request.display_name.as_deref())
        .await
        .map_err(engine_error)?;
    Ok(Json(StatusMessage {
        status: "success",
        message: "Payment confirmed and product delivered".to_string(),
    }))
}

async fn send_message(
    State(state): State<ApiState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<ApiError>)> {
    state.engine.send_manual(&request.identity, &request.message).await.map_err(engine_error)?;
    Ok(Json(StatusMessage { status: "success", message: "Message sent".to_string() }))
}

fn engine_error(error: EngineError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        EngineError::UnknownConversation(_) => StatusCode::NOT_FOUND,
        EngineError::NotAwaitingProof(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use embudo_agent::classifier::ClassifierGateway;
    use embudo_agent::engine::FunnelEngine;
    use embudo_agent::llm::NoopLlmClient;
    use embudo_agent::stages::StageServices;
    use embudo_core::outbound::NoopReplySender;
    use embudo_core::{MessageCatalog, OfferConfig, PriceBook};
    use embudo_db::{ConversationStore, InMemoryConversationStore};
    use serde_json::json;

    use super::{
        confirm_payment, delete_conversation, evolution_webhook, get_conversation,
        list_conversations, ApiState, ConfirmPaymentRequest,
    };

    const CARLOS: &str = "593999000001@s.whatsapp.net";

    fn api_state() -> ApiState {
        let services = Arc::new(StageServices {
            catalog: MessageCatalog::new().expect("catalog builds"),
            pricing: PriceBook::default(),
            offer: OfferConfig::default(),
            classifier: ClassifierGateway::new(Arc::new(NoopLlmClient)),
        });
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::default());
        let engine = Arc::new(FunnelEngine::new(
            services,
            store,
            Arc::new(NoopReplySender),
            "593000000000@s.whatsapp.net",
        ));
        ApiState { engine }
    }

    fn upsert(text: &str) -> serde_json::Value {
        json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": CARLOS, "fromMe": false},
                "message": {"conversation": text},
            },
        })
    }

    #[tokio::test]
    async fn foreign_events_are_acknowledged_as_ignored() {
        let state = api_state();
        let (status, Json(body)) = evolution_webhook(
            State(state),
            Json(json!({"event": "connection.update", "data": {}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
        assert_eq!(body["reason"], "unsupported event");
    }

    #[tokio::test]
    async fn a_text_delivery_creates_a_conversation() {
        let state = api_state();

        let (status, Json(body)) =
            evolution_webhook(State(state.clone()), Json(upsert("Hola"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let Json(listing) = list_conversations(State(state.clone())).await.expect("listing");
        assert_eq!(listing.count, 1);
        assert_eq!(listing.conversations[0].identity, CARLOS);
        assert_eq!(listing.conversations[0].stage, "greeter");

        let Json(single) = get_conversation(Path(CARLOS.to_string()), State(state))
            .await
            .expect("single lookup");
        assert_eq!(single["conversation"]["identity"], CARLOS);
    }

    #[tokio::test]
    async fn missing_conversations_are_a_404() {
        let state = api_state();
        let (status, _) = get_conversation(Path("ghost@s.whatsapp.net".to_string()), State(state))
            .await
            .err()
            .expect("lookup must fail");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn confirm_payment_distinguishes_unknown_from_not_waiting() {
        let state = api_state();

        let (status, _) = confirm_payment(
            State(state.clone()),
            Json(ConfirmPaymentRequest { identity: CARLOS.to_string(), display_name: None }),
        )
        .await
        .err()
        .expect("unknown identity must fail");
        assert_eq!(status, StatusCode::NOT_FOUND);

        evolution_webhook(State(state.clone()), Json(upsert("Hola"))).await;
        let (status, _) = confirm_payment(
            State(state),
            Json(ConfirmPaymentRequest { identity: CARLOS.to_string(), display_name: None }),
        )
        .await
        .err()
        .expect("greeter stage is not waiting for a proof");
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn purge_reports_whether_a_record_existed() {
        let state = api_state();
        evolution_webhook(State(state.clone()), Json(upsert("Hola"))).await;

        let Json(body) = delete_conversation(Path(CARLOS.to_string()), State(state.clone()))
            .await
            .expect("purge");
        assert_eq!(body["deleted"], true);

        let Json(body) =
            delete_conversation(Path(CARLOS.to_string()), State(state)).await.expect("re-purge");
        assert_eq!(body["deleted"], false);
    }
}
