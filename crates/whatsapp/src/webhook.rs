use serde::Deserialize;
use serde_json::Value;

use embudo_core::domain::message::InboundMessage;

/// Outcome of parsing one webhook delivery. `Ignored` is not an error; the
/// endpoint acknowledges those with the reason so Evolution stops retrying.
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookEvent {
    Message(InboundMessage),
    Ignored { reason: &'static str },
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: Option<String>,
    data: Option<MessageData>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    key: Option<MessageKey>,
    message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    #[serde(rename = "remoteJid")]
    remote_jid: Option<String>,
    #[serde(rename = "fromMe")]
    from_me: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    conversation: Option<String>,
    #[serde(rename = "extendedTextMessage")]
    extended_text_message: Option<ExtendedText>,
    #[serde(rename = "imageMessage")]
    image_message: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExtendedText {
    text: Option<String>,
}

/// Maps an Evolution `messages.upsert` delivery onto an [`InboundMessage`].
/// Everything else (other events, own messages, empty bodies) is `Ignored`.
pub fn parse_event(payload: Value) -> WebhookEvent {
    let payload: WebhookPayload = match serde_json::from_value(payload) {
        Ok(parsed) => parsed,
        Err(_) => return WebhookEvent::Ignored { reason: "malformed payload" },
    };

    if payload.event.as_deref() != Some("messages.upsert") {
        return WebhookEvent::Ignored { reason: "unsupported event" };
    }

    let data = match payload.data {
        Some(data) => data,
        None => return WebhookEvent::Ignored { reason: "no content" },
    };

    let key = match data.key {
        Some(key) => key,
        None => return WebhookEvent::Ignored { reason: "missing sender" },
    };

    if key.from_me.unwrap_or(false) {
        return WebhookEvent::Ignored { reason: "own message" };
    }

    let identity = match key.remote_jid {
        Some(jid) if !jid.trim().is_empty() => jid,
        _ => return WebhookEvent::Ignored { reason: "missing sender" },
    };

    let body = match data.message {
        Some(body) => body,
        None => return WebhookEvent::Ignored { reason: "no content" },
    };

    if let Some(text) = body.conversation {
        return text_event(identity, text);
    }

    if let Some(extended) = body.extended_text_message {
        return text_event(identity, extended.text.unwrap_or_default());
    }

    if let Some(image) = body.image_message {
        return WebhookEvent::Message(InboundMessage::image(identity, image));
    }

    WebhookEvent::Ignored { reason: "unknown message type" }
}

fn text_event(identity: String, text: String) -> WebhookEvent {
    if text.trim().is_empty() {
        return WebhookEvent::Ignored { reason: "no content" };
    }
    WebhookEvent::Message(InboundMessage::text(identity, text))
}
