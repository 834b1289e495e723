//! WhatsApp Integration - Evolution API channel
//!
//! This crate provides the WhatsApp interface for embudo:
//! - **Client** (`client`) - Evolution API calls (text, presence, typing)
//! - **Webhooks** (`webhook`) - `messages.upsert` payload parsing
//! - **Pacing** (`pacing`) - human-cadence outbound delivery
//!
//! # Getting Started
//!
//! 1. Run an Evolution API instance and pair it with a WhatsApp number
//! 2. Point its webhook at `POST /webhooks/evolution`
//! 3. Set `EMBUDO_CHANNEL_BASE_URL`, `EMBUDO_CHANNEL_API_KEY`,
//!    `EMBUDO_CHANNEL_INSTANCE`
//!
//! # Architecture
//!
//! ```text
//! Evolution webhook → parse_event → Funnel Engine → HumanizedSender
//!                                                        ↓
//!                               presence → typing → delay → sendText
//! ```

pub mod client;
pub mod pacing;
pub mod webhook;

pub use client::{ChannelError, ChannelTransport, EvolutionClient, Presence, Typing};
pub use pacing::{HumanizedSender, PacingPolicy};
pub use webhook::{parse_event, WebhookEvent};
