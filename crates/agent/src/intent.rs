//! Deterministic keyword matching for every funnel decision point.
//!
//! Matching is case-insensitive substring search over ordered keyword
//! tables; the first table that hits wins, so table order encodes the
//! tie-break (purchase before objection, rejection before acceptance).
//! `None` means no table matched and the caller may consult the
//! classifier. Everything here is pure and total over arbitrary text.

use embudo_core::domain::country::KNOWN_COUNTRIES;
use embudo_core::ExperienceLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteIntent {
    Purchase,
    Info,
    Objection,
    Unclear,
}

impl RouteIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteIntent::Purchase => "purchase",
            RouteIntent::Info => "info",
            RouteIntent::Objection => "objection",
            RouteIntent::Unclear => "unclear",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "purchase" => Some(RouteIntent::Purchase),
            "info" => Some(RouteIntent::Info),
            "objection" => Some(RouteIntent::Objection),
            "unclear" => Some(RouteIntent::Unclear),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsellIntent {
    Accept,
    Info,
    Reject,
    Unclear,
}

impl UpsellIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsellIntent::Accept => "accept",
            UpsellIntent::Info => "info",
            UpsellIntent::Reject => "reject",
            UpsellIntent::Unclear => "unclear",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accept" => Some(UpsellIntent::Accept),
            "info" => Some(UpsellIntent::Info),
            "reject" => Some(UpsellIntent::Reject),
            "unclear" => Some(UpsellIntent::Unclear),
            _ => None,
        }
    }
}

/// How a user answered the payment instructions. Total: anything that is
/// not a question, confirmation, or hesitation is `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloserResponse {
    Question,
    Confirm,
    Reconsider,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectionKind {
    Price,
    Timing,
    General,
}

/// Name and country pulled out of free text. Produced only when both
/// halves were found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub country: String,
}

const PURCHASE_KEYWORDS: &[&str] = &[
    "1",
    "comprar",
    "pagar",
    "precio",
    "cómo pago",
    "como pago",
    "quiero",
    "proceder",
    "sí quiero",
    "si quiero",
    "me interesa",
    "cuánto",
    "cuanto",
];

const INFO_KEYWORDS: &[&str] = &[
    "2",
    "más info",
    "mas info",
    "información",
    "informacion",
    "cómo funciona",
    "como funciona",
    "detalles",
    "qué incluye",
    "que incluye",
    "saber más",
    "saber mas",
];

const OBJECTION_KEYWORDS: &[&str] = &[
    "3",
    "caro",
    "no tengo",
    "sin dinero",
    "después",
    "luego",
    "espera",
    "duda",
    "dudas",
    "no sé",
    "no se",
    "pensarlo",
];

const BEGINNER_KEYWORDS: &[&str] =
    &["1", "novato", "principiante", "desde cero", "cero", "empezando", "nunca"];

const INTERMEDIATE_KEYWORDS: &[&str] =
    &["2", "intermedio", "algo de experiencia", "un poco", "he usado", "he probado"];

const ADVANCED_KEYWORDS: &[&str] = &["3", "avanzado", "experto", "profesional", "domino"];

// Rejections go first so "no lo quiero" never reads as an acceptance.
const UPSELL_REJECT_KEYWORDS: &[&str] = &[
    "3",
    "no, gracias",
    "no gracias",
    "no me interesa",
    "no lo quiero",
    "no quiero",
    "paso",
    "tal vez después",
    "tal vez despues",
    "por ahora no",
    "en otro momento",
];

const UPSELL_ACCEPT_KEYWORDS: &[&str] = &[
    "1",
    "sí, lo quiero",
    "si, lo quiero",
    "sí quiero",
    "si quiero",
    "quiero el curso",
    "lo quiero",
    "acepto",
    "claro que sí",
    "claro que si",
];

const UPSELL_INFO_KEYWORDS: &[&str] = &[
    "2",
    "más información",
    "mas informacion",
    "más info",
    "mas info",
    "detalles",
    "de qué trata",
    "de que trata",
    "qué incluye",
    "que incluye",
    "cuánto dura",
    "cuanto dura",
];

const CONFIRM_KEYWORDS: &[&str] = &["ok", "listo", "ya", "ahora", "voy", "entendido"];

const RECONSIDER_KEYWORDS: &[&str] = &["no", "espera", "después", "luego"];

const RESTART_KEYWORDS: &[&str] = &["reiniciar", "empezar de nuevo"];

/// Words that start a salutation rather than a name. Checked against the
/// first word of a candidate name so "Holanda" stays a valid surname.
const GREETING_WORDS: &[&str] = &["hola", "buenas", "buenos", "hello", "hey", "hi", "saludos"];

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn any_hit(normalized: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| normalized.contains(keyword))
}

fn first_match<T: Copy>(normalized: &str, tables: &[(&[&str], T)]) -> Option<T> {
    tables
        .iter()
        .find(|(keywords, _)| any_hit(normalized, keywords))
        .map(|(_, label)| *label)
}

pub fn match_route(text: &str) -> Option<RouteIntent> {
    let normalized = normalize(text);
    first_match(
        &normalized,
        &[
            (PURCHASE_KEYWORDS, RouteIntent::Purchase),
            (INFO_KEYWORDS, RouteIntent::Info),
            (OBJECTION_KEYWORDS, RouteIntent::Objection),
        ],
    )
}

pub fn match_experience(text: &str) -> Option<ExperienceLevel> {
    let normalized = normalize(text);
    first_match(
        &normalized,
        &[
            (BEGINNER_KEYWORDS, ExperienceLevel::Beginner),
            (INTERMEDIATE_KEYWORDS, ExperienceLevel::Intermediate),
            (ADVANCED_KEYWORDS, ExperienceLevel::Advanced),
        ],
    )
}

pub fn match_upsell(text: &str) -> Option<UpsellIntent> {
    let normalized = normalize(text);
    first_match(
        &normalized,
        &[
            (UPSELL_REJECT_KEYWORDS, UpsellIntent::Reject),
            (UPSELL_ACCEPT_KEYWORDS, UpsellIntent::Accept),
            (UPSELL_INFO_KEYWORDS, UpsellIntent::Info),
        ],
    )
}

/// Question beats confirmation beats hesitation; a message carrying both
/// "entendido" and "no" is read as the confirmation it leads with.
pub fn closer_response(text: &str) -> CloserResponse {
    let normalized = normalize(text);
    if text.contains(['?', '¿']) || normalized.contains("duda") || normalized.contains("pregunta") {
        return CloserResponse::Question;
    }
    if any_hit(&normalized, CONFIRM_KEYWORDS) {
        return CloserResponse::Confirm;
    }
    if any_hit(&normalized, RECONSIDER_KEYWORDS) {
        return CloserResponse::Reconsider;
    }
    CloserResponse::Other
}

pub fn objection_kind(text: &str) -> ObjectionKind {
    let normalized = normalize(text);
    if normalized.contains("caro") || normalized.contains("precio") {
        ObjectionKind::Price
    } else if normalized.contains("después")
        || normalized.contains("despues")
        || normalized.contains("luego")
        || normalized.contains("tarde")
    {
        ObjectionKind::Timing
    } else {
        ObjectionKind::General
    }
}

pub fn is_restart_request(text: &str) -> bool {
    any_hit(&normalize(text), RESTART_KEYWORDS)
}

/// Maps free text onto the canonical country list, so "vivo en peru"
/// resolves to "Perú" with its accent restored.
pub fn canonical_country(raw: &str) -> Option<&'static str> {
    let normalized = normalize(raw);
    KNOWN_COUNTRIES
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, canonical)| *canonical)
}

/// Pulls name and country out of a contact reply.
///
/// The comma form ("Carlos, Ecuador") is tried first; otherwise a country
/// keyword is located and removed, and whatever text remains becomes the
/// name candidate. Candidates that open with a greeting are discarded, so
/// "Hola" never gets stored as someone's name.
pub fn extract_contact(text: &str) -> Option<Contact> {
    if let Some((left, right)) = text.split_once(',') {
        let name = title_case(left);
        let country_raw = right.trim();
        if !name.is_empty() && !country_raw.is_empty() && !is_greeting(&name) {
            let country = canonical_country(country_raw)
                .map(str::to_string)
                .unwrap_or_else(|| title_case(country_raw));
            return Some(Contact { name, country });
        }
    }

    let lowered = text.to_lowercase();
    for (keyword, canonical) in KNOWN_COUNTRIES {
        if let Some(position) = lowered.find(keyword) {
            let mut remainder = lowered.clone();
            remainder.replace_range(position..position + keyword.len(), "");
            let cleaned: String =
                remainder.chars().filter(|c| !matches!(c, ',' | '.')).collect();
            let name = title_case(&cleaned);
            if name.is_empty() || is_greeting(&name) {
                return None;
            }
            return Some(Contact { name, country: (*canonical).to_string() });
        }
    }

    None
}

/// Last-resort name when extraction keeps failing: the first word of the
/// message, or a friendly generic.
pub fn fallback_name(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(title_case)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Amigo/a".to_string())
}

fn is_greeting(candidate: &str) -> bool {
    candidate
        .to_lowercase()
        .split_whitespace()
        .next()
        .is_some_and(|first| GREETING_WORDS.contains(&first))
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
