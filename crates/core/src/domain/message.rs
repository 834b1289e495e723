use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel-agnostic inbound event, produced by the transport layer's webhook
/// parser and consumed by the funnel engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub identity: String,
    pub kind: MessageKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageKind {
    Text { body: String },
    /// Image payloads are opaque proof metadata (url, mimetype, caption).
    /// They are never classified; the funnel only stores them.
    Image { payload: Value },
}

impl InboundMessage {
    pub fn text(identity: impl Into<String>, body: impl Into<String>) -> Self {
        InboundMessage { identity: identity.into(), kind: MessageKind::Text { body: body.into() } }
    }

    pub fn image(identity: impl Into<String>, payload: Value) -> Self {
        InboundMessage { identity: identity.into(), kind: MessageKind::Image { payload } }
    }
}
