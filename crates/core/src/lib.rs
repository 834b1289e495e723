pub use chrono;

pub mod config;
pub mod domain;
pub mod outbound;
pub mod pricing;
pub mod templates;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, OfferConfig};
pub use domain::conversation::{ConversationState, ExperienceLevel, FunnelStage};
pub use domain::country::{country_flag, KNOWN_COUNTRIES};
pub use domain::message::{InboundMessage, MessageKind};
pub use outbound::{ReplySender, SendError};
pub use pricing::{PriceBook, PriceQuote};
pub use templates::{MessageCatalog, TemplateError};
