//! Constrained-prompt classification with fail-closed defaults.
//!
//! Every decision point follows one policy: build a prompt that pins a
//! closed label set, validate whatever comes back against that set, and
//! substitute the least commercially aggressive label when the model is
//! unreachable or answers off-script. A broken classifier can therefore
//! slow the funnel down but never push a sale.

use std::sync::Arc;

use embudo_core::ExperienceLevel;
use serde_json::Value;
use tracing::{debug, warn};

use crate::intent::{RouteIntent, UpsellIntent};
use crate::llm::{CompletionRequest, LlmClient};

pub struct ClassifierGateway {
    llm: Arc<dyn LlmClient>,
}

impl ClassifierGateway {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        ClassifierGateway { llm }
    }

    /// Experience level from a free-form answer. Defaults to beginner so a
    /// misread never skips the foundational material.
    pub async fn classify_experience(&self, message: &str, name: &str) -> ExperienceLevel {
        let request = CompletionRequest {
            system: "Eres un clasificador experto que determina el nivel de experiencia de \
                     usuarios. Responde solo con: beginner, intermediate o advanced"
                .to_string(),
            user: format!(
                "Analiza la siguiente respuesta de {name} sobre su nivel de experiencia y \
                 clasifícalo.\n\n\
                 Respuesta del usuario: \"{message}\"\n\n\
                 Clasifica su nivel como:\n\
                 - \"beginner\" si es novato, principiante, empieza de cero, nunca ha hecho esto\n\
                 - \"intermediate\" si tiene algo de experiencia, conoce lo básico, ha probado antes\n\
                 - \"advanced\" si es experto, avanzado, tiene mucha experiencia, domina el tema\n\n\
                 Responde SOLO con una palabra: beginner, intermediate o advanced"
            ),
            max_tokens: 10,
        };

        match self.label(&request).await.as_deref() {
            Some("beginner") => ExperienceLevel::Beginner,
            Some("intermediate") => ExperienceLevel::Intermediate,
            Some("advanced") => ExperienceLevel::Advanced,
            Some(other) => {
                warn!(label = other, "unexpected experience label, defaulting to beginner");
                ExperienceLevel::Beginner
            }
            None => ExperienceLevel::Beginner,
        }
    }

    /// Purchase intent at the router. Defaults to unclear, which re-prompts
    /// the menu instead of assuming a sale.
    pub async fn classify_route(&self, message: &str, name: &str, context: &str) -> RouteIntent {
        let context_line =
            if context.is_empty() { String::new() } else { format!("Contexto: {context}\n") };
        let request = CompletionRequest {
            system: "Eres un clasificador experto de intenciones de compra. Responde solo con: \
                     purchase, info, objection o unclear"
                .to_string(),
            user: format!(
                "Analiza la intención del siguiente mensaje de {name}.\n\n\
                 Mensaje: \"{message}\"\n\
                 {context_line}\n\
                 Clasifica la intención como:\n\
                 - \"purchase\" si quiere comprar, proceder, le interesa, dice cuánto cuesta, \
                 pregunta cómo pagar\n\
                 - \"info\" si quiere más información, detalles, características, cómo funciona\n\
                 - \"objection\" si tiene dudas, dice que está caro, no tiene dinero, lo dejará \
                 para después\n\
                 - \"unclear\" si no está claro o es otro tema\n\n\
                 Responde SOLO con una palabra: purchase, info, objection o unclear"
            ),
            max_tokens: 10,
        };

        match self.label(&request).await {
            Some(label) => RouteIntent::parse(&label).unwrap_or_else(|| {
                warn!(label, "unexpected route label, defaulting to unclear");
                RouteIntent::Unclear
            }),
            None => RouteIntent::Unclear,
        }
    }

    /// Reaction to the upsell offer. Defaults to unclear, never to accept.
    pub async fn classify_upsell(&self, message: &str, name: &str) -> UpsellIntent {
        let request = CompletionRequest {
            system: "Eres un clasificador experto de intenciones de compra para upsells. \
                     Responde solo con: accept, info, reject o unclear"
                .to_string(),
            user: format!(
                "Analiza la respuesta de {name} a una oferta de un curso avanzado (upsell).\n\n\
                 Mensaje: \"{message}\"\n\n\
                 Clasifica la intención como:\n\
                 - \"accept\" si dice que sí, lo quiere, le interesa, pregunta cómo pagar, acepta \
                 la oferta\n\
                 - \"info\" si quiere más información, de qué trata, qué incluye, cuánto dura\n\
                 - \"reject\" si dice que no, no gracias, por ahora no, en otro momento, está muy \
                 caro\n\
                 - \"unclear\" si no está claro o habla de otra cosa\n\n\
                 Responde SOLO con una palabra: accept, info, reject o unclear"
            ),
            max_tokens: 10,
        };

        match self.label(&request).await {
            Some(label) => UpsellIntent::parse(&label).unwrap_or_else(|| {
                warn!(label, "unexpected upsell label, defaulting to unclear");
                UpsellIntent::Unclear
            }),
            None => UpsellIntent::Unclear,
        }
    }

    /// Structured name/country extraction. Absent, null, or "unknown"
    /// fields come back as `None`; so does any transport or parse failure.
    pub async fn parse_contact(&self, message: &str) -> (Option<String>, Option<String>) {
        let request = CompletionRequest {
            system: "Eres un extractor experto de información. Responde SOLO con JSON válido, \
                     sin texto adicional."
                .to_string(),
            user: format!(
                "Extrae el nombre y el país del siguiente mensaje:\n\n\
                 Mensaje: \"{message}\"\n\n\
                 Responde en formato JSON exactamente así:\n\
                 {{\"name\": \"Nombre\", \"country\": \"País\"}}\n\n\
                 Si no encuentras el nombre o país, usa null.\n\
                 El país debe estar en español y capitalizado (Ecuador, Colombia, Perú, etc.)\n\
                 Responde SOLO con el JSON, sin texto adicional."
            ),
            max_tokens: 50,
        };

        match self.llm.complete(&request).await {
            Ok(raw) => parse_contact_response(&raw),
            Err(error) => {
                warn!(%error, "contact extraction failed");
                (None, None)
            }
        }
    }

    async fn label(&self, request: &CompletionRequest) -> Option<String> {
        match self.llm.complete(request).await {
            Ok(raw) => Some(raw.trim().to_lowercase()),
            Err(error) => {
                warn!(%error, "classification call failed, using the decision default");
                None
            }
        }
    }
}

/// Lifts the JSON object out of the response even when the model wrapped
/// it in prose, then reads both fields defensively.
fn parse_contact_response(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => return (None, None),
    };

    let parsed: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(error) => {
            debug!(%error, "classifier returned malformed contact json");
            return (None, None);
        }
    };

    (contact_field(&parsed, "name"), contact_field(&parsed, "country"))
}

fn contact_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|field| {
            !field.is_empty()
                && !field.eq_ignore_ascii_case("unknown")
                && !field.eq_ignore_ascii_case("null")
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use embudo_core::ExperienceLevel;

    use super::ClassifierGateway;
    use crate::intent::{RouteIntent, UpsellIntent};
    use crate::llm::{CompletionRequest, LlmClient};

    /// Plays back canned completions and records every request it saw.
    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    #[tokio::test]
    async fn well_formed_labels_pass_validation() {
        let llm = ScriptedLlm::new(vec![Ok("  ADVANCED \n".to_string())]);
        let gateway = ClassifierGateway::new(llm);
        assert_eq!(gateway.classify_experience("domino el tema", "Carlos").await, ExperienceLevel::Advanced);
    }

    #[tokio::test]
    async fn off_script_labels_fall_back_per_decision_point() {
        let llm = ScriptedLlm::new(vec![
            Ok("expert".to_string()),
            Ok("buy now!".to_string()),
            Ok("sure".to_string()),
        ]);
        let gateway = ClassifierGateway::new(llm);

        assert_eq!(gateway.classify_experience("x", "Carlos").await, ExperienceLevel::Beginner);
        assert_eq!(gateway.classify_route("x", "Carlos", "").await, RouteIntent::Unclear);
        assert_eq!(gateway.classify_upsell("x", "Carlos").await, UpsellIntent::Unclear);
    }

    #[tokio::test]
    async fn transport_failure_uses_the_decision_default() {
        let llm = ScriptedLlm::new(vec![]);
        let gateway = ClassifierGateway::new(llm);

        assert_eq!(gateway.classify_experience("x", "Carlos").await, ExperienceLevel::Beginner);
        assert_eq!(gateway.classify_route("x", "Carlos", "nivel").await, RouteIntent::Unclear);
        assert_eq!(gateway.classify_upsell("x", "Carlos").await, UpsellIntent::Unclear);
        assert_eq!(gateway.parse_contact("x").await, (None, None));
    }

    #[tokio::test]
    async fn prompts_pin_the_closed_label_set() {
        let llm = ScriptedLlm::new(vec![Ok("purchase".to_string())]);
        let gateway = ClassifierGateway::new(Arc::clone(&llm) as Arc<dyn LlmClient>);

        let intent = gateway.classify_route("quiero verlo", "Ana", "Usuario de nivel beginner").await;
        assert_eq!(intent, RouteIntent::Purchase);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 10);
        assert!(requests[0].system.contains("purchase, info, objection o unclear"));
        assert!(requests[0].user.contains("Mensaje: \"quiero verlo\""));
        assert!(requests[0].user.contains("Contexto: Usuario de nivel beginner"));
    }

    #[tokio::test]
    async fn contact_json_survives_surrounding_prose() {
        let llm = ScriptedLlm::new(vec![Ok(
            "Claro: {\"name\": \"Carlos\", \"country\": \"Ecuador\"} listo".to_string()
        )]);
        let gateway = ClassifierGateway::new(llm);

        let (name, country) = gateway.parse_contact("soy carlos de ecuador").await;
        assert_eq!(name.as_deref(), Some("Carlos"));
        assert_eq!(country.as_deref(), Some("Ecuador"));
    }

    #[tokio::test]
    async fn contact_nulls_and_unknowns_become_none() {
        let llm = ScriptedLlm::new(vec![
            Ok("{\"name\": null, \"country\": \"Unknown\"}".to_string()),
            Ok("not json at all".to_string()),
        ]);
        let gateway = ClassifierGateway::new(llm);

        assert_eq!(gateway.parse_contact("hola").await, (None, None));
        assert_eq!(gateway.parse_contact("hola").await, (None, None));
    }
}
