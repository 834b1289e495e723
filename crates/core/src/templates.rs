//! Outbound message catalog.
//!
//! Every text the funnel sends is a Tera template embedded at compile time
//! from `templates/messages/`. Handlers render by name with a typed context;
//! nothing in the engine concatenates Spanish prose by hand.

use std::collections::HashMap;

use tera::{Context, Tera};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template registration failed: {0}")]
    Registration(#[source] tera::Error),
    #[error("rendering `{name}` failed: {source}")]
    Render {
        name: String,
        #[source]
        source: tera::Error,
    },
}

pub struct MessageCatalog {
    tera: Tera,
}

impl MessageCatalog {
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.register_filter("money", tera_money_filter);

        for (name, body) in EMBEDDED_MESSAGES {
            tera.add_raw_template(name, body).map_err(TemplateError::Registration)?;
        }

        Ok(MessageCatalog { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, TemplateError> {
        let rendered = self
            .tera
            .render(name, context)
            .map_err(|source| TemplateError::Render { name: name.to_string(), source })?;
        Ok(rendered.trim_end().to_string())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        EMBEDDED_MESSAGES.iter().map(|(name, _)| *name)
    }
}

/// 2-decimal money formatting. Accepts Tera numbers and the string form
/// `rust_decimal::Decimal` serializes to.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let num = match value {
        tera::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        tera::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        tera::Value::Null => 0.0,
        _ => 0.0,
    };

    Ok(tera::Value::String(format!("{:.2}", num)))
}

const EMBEDDED_MESSAGES: &[(&str, &str)] = &[
    ("greeter_welcome", include_str!("../../../templates/messages/greeter_welcome.tera")),
    ("greeter_retry", include_str!("../../../templates/messages/greeter_retry.tera")),
    (
        "consultant_level_question",
        include_str!("../../../templates/messages/consultant_level_question.tera"),
    ),
    ("consultant_gift", include_str!("../../../templates/messages/consultant_gift.tera")),
    ("consultant_reprompt", include_str!("../../../templates/messages/consultant_reprompt.tera")),
    ("router_menu", include_str!("../../../templates/messages/router_menu.tera")),
    ("router_info", include_str!("../../../templates/messages/router_info.tera")),
    (
        "router_objection_price",
        include_str!("../../../templates/messages/router_objection_price.tera"),
    ),
    (
        "router_objection_timing",
        include_str!("../../../templates/messages/router_objection_timing.tera"),
    ),
    (
        "router_objection_general",
        include_str!("../../../templates/messages/router_objection_general.tera"),
    ),
    ("closer_payment_bank", include_str!("../../../templates/messages/closer_payment_bank.tera")),
    (
        "closer_payment_international",
        include_str!("../../../templates/messages/closer_payment_international.tera"),
    ),
    ("closer_question", include_str!("../../../templates/messages/closer_question.tera")),
    ("closer_waiting", include_str!("../../../templates/messages/closer_waiting.tera")),
    ("closer_reconsider", include_str!("../../../templates/messages/closer_reconsider.tera")),
    ("closer_default", include_str!("../../../templates/messages/closer_default.tera")),
    (
        "verifier_rejected_image",
        include_str!("../../../templates/messages/verifier_rejected_image.tera"),
    ),
    (
        "verifier_proof_received",
        include_str!("../../../templates/messages/verifier_proof_received.tera"),
    ),
    ("verifier_reviewing", include_str!("../../../templates/messages/verifier_reviewing.tera")),
    ("verifier_delivery", include_str!("../../../templates/messages/verifier_delivery.tera")),
    (
        "operator_payment_pending",
        include_str!("../../../templates/messages/operator_payment_pending.tera"),
    ),
    ("operator_delivered", include_str!("../../../templates/messages/operator_delivered.tera")),
    ("upsell_payment_bank", include_str!("../../../templates/messages/upsell_payment_bank.tera")),
    (
        "upsell_payment_international",
        include_str!("../../../templates/messages/upsell_payment_international.tera"),
    ),
    ("upsell_info", include_str!("../../../templates/messages/upsell_info.tera")),
    ("upsell_reject", include_str!("../../../templates/messages/upsell_reject.tera")),
    ("upsell_menu", include_str!("../../../templates/messages/upsell_menu.tera")),
    ("completed_ack", include_str!("../../../templates/messages/completed_ack.tera")),
    ("generic_failure", include_str!("../../../templates/messages/generic_failure.tera")),
];
