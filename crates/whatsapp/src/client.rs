use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use embudo_core::config::ChannelConfig;

/// WhatsApp JID suffix for direct chats.
pub const JID_SUFFIX: &str = "@s.whatsapp.net";

/// Appends the direct-chat suffix when the identity is a bare number.
pub fn to_jid(identity: &str) -> String {
    let identity = identity.trim();
    if identity.contains(JID_SUFFIX) {
        identity.to_string()
    } else {
        format!("{identity}{JID_SUFFIX}")
    }
}

/// The bare phone number of an identity, without the JID suffix.
pub fn phone_of(identity: &str) -> &str {
    identity.trim().split('@').next().unwrap_or(identity)
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("recipient identity is empty")]
    EmptyRecipient,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("evolution api returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Available,
    Unavailable,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Available => "available",
            Presence::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Typing {
    Composing,
    Paused,
}

impl Typing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Typing::Composing => "composing",
            Typing::Paused => "paused",
        }
    }
}

/// Raw channel operations. `HumanizedSender` composes these into the paced
/// delivery sequence; nothing above this trait knows about HTTP.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    async fn set_presence(&self, recipient: &str, presence: Presence) -> Result<(), ChannelError>;

    async fn set_typing(&self, recipient: &str, typing: Typing) -> Result<(), ChannelError>;
}

/// HTTP client for an Evolution API instance.
pub struct EvolutionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    instance: String,
}

impl EvolutionClient {
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            instance: config.instance.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, path, self.instance)
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value, ChannelError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header("apikey", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status: status.as_u16(), body });
        }

        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// Connection state of the paired instance, for the doctor command.
    pub async fn connection_state(&self) -> Result<Value, ChannelError> {
        let response = self
            .http
            .get(self.endpoint("instance/connectionState"))
            .header("apikey", self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status: status.as_u16(), body });
        }

        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChannelTransport for EvolutionClient {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        if recipient.trim().is_empty() {
            return Err(ChannelError::EmptyRecipient);
        }

        let payload = json!({
            "number": to_jid(recipient),
            "text": text,
        });
        self.post("message/sendText", payload).await?;
        debug!(recipient = phone_of(recipient), "text message sent");
        Ok(())
    }

    async fn set_presence(&self, recipient: &str, presence: Presence) -> Result<(), ChannelError> {
        if recipient.trim().is_empty() {
            return Err(ChannelError::EmptyRecipient);
        }

        let payload = json!({
            "number": to_jid(recipient),
            "presence": presence.as_str(),
        });
        self.post("chat/presence", payload).await?;
        Ok(())
    }

    async fn set_typing(&self, recipient: &str, typing: Typing) -> Result<(), ChannelError> {
        if recipient.trim().is_empty() {
            return Err(ChannelError::EmptyRecipient);
        }

        let payload = json!({
            "number": to_jid(recipient),
            "state": typing.as_str(),
            "delay": 2000,
        });
        self.post("chat/presenceUpdate", payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{phone_of, to_jid};

    #[test]
    fn to_jid_appends_the_suffix_once() {
        assert_eq!(to_jid("593999496469"), "593999496469@s.whatsapp.net");
        assert_eq!(to_jid("593999496469@s.whatsapp.net"), "593999496469@s.whatsapp.net");
        assert_eq!(to_jid("  593999496469 "), "593999496469@s.whatsapp.net");
    }

    #[test]
    fn phone_of_strips_the_suffix() {
        assert_eq!(phone_of("593999496469@s.whatsapp.net"), "593999496469");
        assert_eq!(phone_of("593999496469"), "593999496469");
    }
}
