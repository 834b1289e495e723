//! Funnel Runtime - staged conversation orchestration for the sales funnel
//!
//! This crate is the "brain" of the embudo system - everything between a
//! parsed inbound message and the rendered replies:
//! - Deterministic intent matching over Spanish keyword tables (`intent`)
//! - A strictly-validated AI fallback for ambiguous messages (`classifier`)
//! - One handler per funnel stage (`stages`), chained by the dispatcher
//! - The engine (`engine`), which owns locking, persistence and delivery
//!
//! # Architecture
//!
//! Each message walks a constrained loop:
//! 1. **Serialize** - one in-flight message per identity, ever
//! 2. **Dispatch** (`dispatcher`) - route to the handler for the current stage
//! 3. **Match** (`intent`) - keywords first; the classifier only on a miss
//! 4. **Advance** - forward-only stage transitions, with the next stage's
//!    opening appended to the same reply
//! 5. **Persist, then send** - state is durable before anything leaves
//!
//! # Safety Principle
//!
//! The LLM is strictly a classifier. Its output is matched against a closed
//! label set, and anything else falls back to the safest deterministic
//! default. It never writes user-visible text and never decides prices.

pub mod classifier;
pub mod dispatcher;
pub mod engine;
pub mod intent;
pub mod llm;
pub mod stages;

pub use classifier::ClassifierGateway;
pub use dispatcher::StageDispatcher;
pub use engine::{EngineError, FunnelEngine};
pub use intent::{CloserResponse, Contact, ObjectionKind, RouteIntent, UpsellIntent};
pub use llm::{CompletionRequest, HttpLlmClient, LlmClient, NoopLlmClient};
pub use stages::{StageHandler, StageReply, StageServices};
