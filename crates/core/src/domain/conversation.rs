use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelStage {
    Greeter,
    Consultant,
    Router,
    Closer,
    Verifier,
    Upsell,
    Completed,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Greeter => "greeter",
            FunnelStage::Consultant => "consultant",
            FunnelStage::Router => "router",
            FunnelStage::Closer => "closer",
            FunnelStage::Verifier => "verifier",
            FunnelStage::Upsell => "upsell",
            FunnelStage::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "greeter" => Some(FunnelStage::Greeter),
            "consultant" => Some(FunnelStage::Consultant),
            "router" => Some(FunnelStage::Router),
            "closer" => Some(FunnelStage::Closer),
            "verifier" => Some(FunnelStage::Verifier),
            "upsell" => Some(FunnelStage::Upsell),
            "completed" => Some(FunnelStage::Completed),
            _ => None,
        }
    }

    /// Position in the funnel order. Transitions may only move to an equal or
    /// higher index; equal covers the router/closer/upsell self-loops.
    pub fn funnel_index(&self) -> u8 {
        match self {
            FunnelStage::Greeter => 0,
            FunnelStage::Consultant => 1,
            FunnelStage::Router => 2,
            FunnelStage::Closer => 3,
            FunnelStage::Verifier => 4,
            FunnelStage::Upsell => 5,
            FunnelStage::Completed => 6,
        }
    }

    pub fn can_advance_to(&self, next: FunnelStage) -> bool {
        next.funnel_index() >= self.funnel_index()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FunnelStage::Completed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beginner" | "principiante" => Some(ExperienceLevel::Beginner),
            "intermediate" | "intermedio" => Some(ExperienceLevel::Intermediate),
            "advanced" | "avanzado" => Some(ExperienceLevel::Advanced),
            _ => None,
        }
    }
}

/// Durable per-identity record. The only unit of state the funnel mutates,
/// always through the dispatcher path under the identity lock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub identity: String,
    pub display_name: Option<String>,
    pub country: Option<String>,
    pub experience: Option<ExperienceLevel>,
    pub stage: FunnelStage,
    /// Stage-private cursor. Cleared on every stage entry; only the handler
    /// that owns the current stage may read or write it.
    pub sub_step: Option<String>,
    pub final_price: Option<Decimal>,
    pub awaiting_proof: bool,
    pub proof_received: bool,
    pub proof_payload: Option<Value>,
    pub payment_confirmed: bool,
    pub product_delivered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: i64,
}

impl ConversationState {
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        ConversationState {
            identity: identity.into(),
            display_name: None,
            country: None,
            experience: None,
            stage: FunnelStage::Greeter,
            sub_step: None,
            final_price: None,
            awaiting_proof: false,
            proof_received: false,
            proof_payload: None,
            payment_confirmed: false,
            product_delivered: false,
            created_at: now,
            updated_at: now,
            last_message_at: None,
            message_count: 0,
        }
    }

    /// Moves to `next` and clears the sub-step so the new owner starts from
    /// a blank cursor. Callers are expected to have checked funnel order.
    pub fn enter_stage(&mut self, next: FunnelStage) {
        self.stage = next;
        self.sub_step = None;
    }

    pub fn set_sub_step(&mut self, step: &str) {
        self.sub_step = Some(step.to_string());
    }

    pub fn sub_step_is(&self, step: &str) -> bool {
        self.sub_step.as_deref() == Some(step)
    }

    /// Records an inbound message against the audit fields. Called exactly
    /// once per processed message, right before the persist.
    pub fn note_message(&mut self) {
        let now = Utc::now();
        self.message_count += 1;
        self.last_message_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Stores a submitted payment proof. Valid only while `awaiting_proof`.
    pub fn store_proof(&mut self, payload: Value) {
        self.proof_received = true;
        self.proof_payload = Some(payload);
    }

    /// Flips the delivery pair. `payment_confirmed` and `product_delivered`
    /// move together and are never unset, not even by `restart`.
    pub fn mark_confirmed(&mut self) {
        self.payment_confirmed = true;
        self.product_delivered = true;
        self.awaiting_proof = false;
    }

    /// Explicit user-requested restart: back to greeter with a blank profile
    /// and disarmed proof tracking. Audit counters and the delivery pair
    /// survive.
    pub fn restart(&mut self) {
        self.display_name = None;
        self.country = None;
        self.experience = None;
        self.final_price = None;
        self.awaiting_proof = false;
        self.proof_received = false;
        self.proof_payload = None;
        self.enter_stage(FunnelStage::Greeter);
    }
}
