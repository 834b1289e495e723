use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport rejected the message: {0}")]
    Transport(String),
    #[error("recipient identity is empty")]
    EmptyRecipient,
}

/// Engine-facing outbound port. `send_reply` is the paced, humanized path
/// used for funnel replies; `send_direct` skips pacing and is used for
/// operator notifications and manual admin sends.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, identity: &str, text: &str) -> Result<(), SendError>;

    async fn send_direct(&self, identity: &str, text: &str) -> Result<(), SendError>;
}

/// Sender that drops everything. Useful when the channel transport is not
/// configured, and as a base for tests.
#[derive(Default)]
pub struct NoopReplySender;

#[async_trait]
impl ReplySender for NoopReplySender {
    async fn send_reply(&self, _identity: &str, _text: &str) -> Result<(), SendError> {
        Ok(())
    }

    async fn send_direct(&self, _identity: &str, _text: &str) -> Result<(), SendError> {
        Ok(())
    }
}
