use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use embudo_core::config::PacingConfig;
use embudo_core::outbound::{ReplySender, SendError};

use crate::client::{ChannelError, ChannelTransport, Presence, Typing};

/// Computes the human-cadence delay for one outbound message: a base jitter
/// plus a per-character jitter, capped so long messages never stall the chat.
pub struct PacingPolicy {
    config: PacingConfig,
}

impl PacingPolicy {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn presence(&self) -> bool {
        self.config.presence
    }

    pub fn typing(&self) -> bool {
        self.config.typing
    }

    pub fn typing_delay(&self, text: &str) -> Duration {
        let mut rng = rand::thread_rng();
        let base = rng.gen_range(self.config.min_base_ms..=self.config.max_base_ms);
        let per_char = rng.gen_range(self.config.min_char_ms..=self.config.max_char_ms);
        let chars = text.chars().count() as u64;
        let total = base.saturating_add(chars.saturating_mul(per_char));
        Duration::from_millis(total.min(self.config.max_delay_ms))
    }
}

/// Outbound port implementation over a channel transport. Funnel replies go
/// through the paced sequence; presence and typing failures are swallowed
/// since only the final text matters.
pub struct HumanizedSender {
    transport: Arc<dyn ChannelTransport>,
    policy: PacingPolicy,
}

impl HumanizedSender {
    pub fn new(transport: Arc<dyn ChannelTransport>, config: PacingConfig) -> Self {
        Self { transport, policy: PacingPolicy::new(config) }
    }

    async fn deliver(&self, identity: &str, text: &str) -> Result<(), SendError> {
        match self.transport.send_text(identity, text).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "paced send failed, retrying direct");
                self.transport.send_text(identity, text).await.map_err(map_channel_error)
            }
        }
    }
}

fn map_channel_error(error: ChannelError) -> SendError {
    match error {
        ChannelError::EmptyRecipient => SendError::EmptyRecipient,
        other => SendError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ReplySender for HumanizedSender {
    async fn send_reply(&self, identity: &str, text: &str) -> Result<(), SendError> {
        if identity.trim().is_empty() {
            return Err(SendError::EmptyRecipient);
        }

        if !self.policy.enabled() {
            return self.deliver(identity, text).await;
        }

        if self.policy.presence() {
            if let Err(error) = self.transport.set_presence(identity, Presence::Available).await {
                debug!(error = %error, "presence update failed");
            }
        }

        if self.policy.typing() {
            if let Err(error) = self.transport.set_typing(identity, Typing::Composing).await {
                debug!(error = %error, "typing indicator failed");
            }
        }

        let delay = self.policy.typing_delay(text);
        debug!(delay_ms = delay.as_millis() as u64, chars = text.chars().count(), "pacing reply");
        tokio::time::sleep(delay).await;

        if self.policy.typing() {
            if let Err(error) = self.transport.set_typing(identity, Typing::Paused).await {
                debug!(error = %error, "typing indicator failed");
            }
        }

        let result = self.deliver(identity, text).await;

        if self.policy.presence() {
            if let Err(error) = self.transport.set_presence(identity, Presence::Unavailable).await {
                debug!(error = %error, "presence update failed");
            }
        }

        result
    }

    async fn send_direct(&self, identity: &str, text: &str) -> Result<(), SendError> {
        if identity.trim().is_empty() {
            return Err(SendError::EmptyRecipient);
        }
        self.transport.send_text(identity, text).await.map_err(map_channel_error)
    }
}
