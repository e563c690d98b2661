//! Intent: what the latest user message is about, and which cards matter.

use crate::card::CardType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Topic category of a user message.
///
/// Declaration order matters: the keyword fallback breaks ties in favour of
/// the earlier category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    ContentGeneration,
    BusinessInfo,
    Compliance,
    TechnicalSetup,
    General,
}

impl IntentCategory {
    /// All categories in declaration order.
    pub const ALL: [IntentCategory; 5] = [
        Self::ContentGeneration,
        Self::BusinessInfo,
        Self::Compliance,
        Self::TechnicalSetup,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentGeneration => "content_generation",
            Self::BusinessInfo => "business_info",
            Self::Compliance => "compliance",
            Self::TechnicalSetup => "technical_setup",
            Self::General => "general",
        }
    }

    /// Parse a category name; anything unrecognised is `General`.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Self::General)
    }

    /// The fixed card types that belong to this category.
    pub fn card_types(&self) -> Vec<CardType> {
        match self {
            Self::ContentGeneration => vec![
                CardType::BrandVoice,
                CardType::ContentGuidelines,
                CardType::TargetAudience,
            ],
            Self::BusinessInfo => vec![
                CardType::BusinessOverview,
                CardType::ProductsServices,
                CardType::Faq,
            ],
            Self::Compliance => vec![CardType::ComplianceRules],
            Self::TechnicalSetup => vec![CardType::TechnicalSetup],
            Self::General => vec![CardType::BusinessOverview],
        }
    }

    /// Whether `card_type` is in this category's fixed type list.
    pub fn covers(&self, card_type: &CardType) -> bool {
        self.card_types().contains(card_type)
    }

    /// Keywords used by the deterministic fallback classifier.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::ContentGeneration => &[
                "write", "draft", "post", "blog", "caption", "email", "newsletter",
                "copy", "headline", "tagline", "tweet", "content", "article", "tone",
            ],
            Self::BusinessInfo => &[
                "price", "pricing", "product", "service", "hours", "location",
                "offer", "customers", "about", "company", "business", "team",
            ],
            Self::Compliance => &[
                "compliance", "legal", "regulation", "disclaimer", "policy",
                "allowed", "forbidden", "claim", "gdpr", "privacy", "terms",
            ],
            Self::TechnicalSetup => &[
                "setup", "set up", "install", "configure", "integration", "api",
                "webhook", "domain", "dns", "login", "connect", "error",
            ],
            Self::General => &[],
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Classifier,
    KeywordFallback,
}

/// The classified intent of one user message. Created fresh every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub category: IntentCategory,
    pub relevant_card_ids: BTreeSet<String>,
    /// 0–100.
    pub confidence: u8,
    pub reasoning: String,
    pub source: IntentSource,
}
