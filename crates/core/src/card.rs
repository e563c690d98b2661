//! Knowledge cards and the per-turn views derived from them.
//!
//! A [`Card`] is a discrete unit of business knowledge owned by the catalog.
//! Raw catalog rows arrive as [`CardRecord`]s with a loosely-typed metadata
//! blob; [`Card::from_record`] validates that blob exactly once into a
//! [`CardMetadata`] so nothing downstream has to guess at its shape.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Relevance at or above which a card is loaded at full fidelity.
pub const FULL_TIER_MIN: u8 = 80;

/// Relevance at or above which a card is loaded as an excerpt.
pub const EXCERPT_TIER_MIN: u8 = 40;

// ── Card type ─────────────────────────────────────────────────────────────

/// The kind of knowledge a card holds.
///
/// Unknown type strings are preserved in `Other` rather than rejected, so a
/// catalog with newer card kinds still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CardType {
    BusinessOverview,
    BrandVoice,
    ProductsServices,
    TargetAudience,
    ContentGuidelines,
    ComplianceRules,
    TechnicalSetup,
    Faq,
    Other(String),
}

impl CardType {
    /// The canonical wire string (e.g. `BRAND_VOICE_CARD`).
    pub fn as_str(&self) -> &str {
        match self {
            Self::BusinessOverview => "BUSINESS_OVERVIEW",
            Self::BrandVoice => "BRAND_VOICE_CARD",
            Self::ProductsServices => "PRODUCTS_SERVICES",
            Self::TargetAudience => "TARGET_AUDIENCE",
            Self::ContentGuidelines => "CONTENT_GUIDELINES",
            Self::ComplianceRules => "COMPLIANCE_RULES",
            Self::TechnicalSetup => "TECHNICAL_SETUP",
            Self::Faq => "FAQ",
            Self::Other(raw) => raw,
        }
    }

    /// The wire string with underscores replaced by spaces
    /// (`BRAND_VOICE_CARD` → `BRAND VOICE CARD`).
    pub fn spaced(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl From<String> for CardType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUSINESS_OVERVIEW" => Self::BusinessOverview,
            "BRAND_VOICE_CARD" => Self::BrandVoice,
            "PRODUCTS_SERVICES" => Self::ProductsServices,
            "TARGET_AUDIENCE" => Self::TargetAudience,
            "CONTENT_GUIDELINES" => Self::ContentGuidelines,
            "COMPLIANCE_RULES" => Self::ComplianceRules,
            "TECHNICAL_SETUP" => Self::TechnicalSetup,
            "FAQ" => Self::Faq,
            _ => Self::Other(raw),
        }
    }
}

impl From<&str> for CardType {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<CardType> for String {
    fn from(card_type: CardType) -> Self {
        card_type.as_str().to_string()
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Catalog records ───────────────────────────────────────────────────────

/// A card exactly as the catalog stores it. Metadata is untyped here.
///
/// Optional fields never reject a record. A missing, null, or wrong-shaped
/// value falls back to its default with a warning:
///
/// | field | default |
/// |-------|---------|
/// | `description` | empty string |
/// | `metadata` | absent (validated later by [`Card::from_record`]) |
/// | `priority` | absent |
/// | `orderIndex` | 0 |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub card_type: CardType,

    pub title: String,

    #[serde(default, deserialize_with = "lenient::description")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    #[serde(
        default,
        deserialize_with = "lenient::priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<i64>,

    #[serde(default, deserialize_with = "lenient::order_index")]
    pub order_index: i64,
}

/// Field deserializers that degrade to defaults instead of failing.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use tracing::warn;

    fn wrong_shape(field: &str, value: &Value, fallback: &str) {
        warn!(field, value = %value, "Wrong-shaped card field; using {fallback}");
    }

    /// An integral number, accepting floats with no fractional part.
    fn integer(value: &Value) -> Option<i64> {
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        })
    }

    pub fn description<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => {
                wrong_shape("description", &other, "an empty description");
                String::new()
            }
        })
    }

    pub fn priority<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(None);
        }
        let priority = integer(&value);
        if priority.is_none() {
            wrong_shape("priority", &value, "no priority");
        }
        Ok(priority)
    }

    pub fn order_index<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(0);
        }
        Ok(integer(&value).unwrap_or_else(|| {
            wrong_shape("orderIndex", &value, "order 0");
            0
        }))
    }
}

/// Typed view over a card's metadata blob.
///
/// | field | source keys | default |
/// |-------|-------------|---------|
/// | `forbidden_words` | `forbiddenWords`, `forbidden_words` | empty |
/// | `declared_confidence` | `confidence` | `None` (fusion uses 70) |
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardMetadata {
    /// The blob as received, used for full-tier rendering.
    pub raw: serde_json::Value,

    /// Words the card asks generated text to avoid.
    pub forbidden_words: Vec<String>,

    /// Source trust declared by the card author, clamped to 0–100.
    pub declared_confidence: Option<u8>,
}

impl CardMetadata {
    /// Validate a raw metadata blob. Never fails: wrong-shaped fields are
    /// reported and treated as absent.
    pub fn parse(card_id: &str, raw: &serde_json::Value) -> (Self, Vec<EngineError>) {
        let mut problems = Vec::new();
        let mut meta = Self {
            raw: raw.clone(),
            ..Self::default()
        };

        let Some(obj) = raw.as_object() else {
            problems.push(malformed(card_id, "metadata", "is not an object"));
            return (meta, problems);
        };

        let forbidden = obj
            .get("forbiddenWords")
            .map(|v| ("forbiddenWords", v))
            .or_else(|| obj.get("forbidden_words").map(|v| ("forbidden_words", v)));

        if let Some((field, value)) = forbidden {
            match value.as_array() {
                Some(items) => {
                    for item in items {
                        match item.as_str().map(str::trim) {
                            Some(word) if !word.is_empty() => {
                                meta.forbidden_words.push(word.to_string())
                            }
                            Some(_) => {}
                            None => problems.push(malformed(
                                card_id,
                                field,
                                "contains a non-string entry",
                            )),
                        }
                    }
                }
                None => problems.push(malformed(card_id, field, "is not a list")),
            }
        }

        if let Some(value) = obj.get("confidence") {
            match value.as_f64() {
                Some(n) if n.is_finite() => {
                    meta.declared_confidence = Some(n.round().clamp(0.0, 100.0) as u8);
                }
                _ => problems.push(malformed(card_id, "confidence", "is not a number")),
            }
        }

        (meta, problems)
    }
}

fn malformed(card_id: &str, field: &str, reason: &str) -> EngineError {
    EngineError::MalformedCardMetadata {
        card_id: card_id.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ── Validated card ────────────────────────────────────────────────────────

/// A catalog card with validated metadata. Immutable within a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: String,
    pub card_type: CardType,
    pub title: String,
    pub description: String,
    pub metadata: Option<CardMetadata>,
    pub priority: Option<i64>,
    pub order_index: i64,
}

impl Card {
    /// Build a card from a catalog record, logging any metadata problems.
    pub fn from_record(record: CardRecord) -> Self {
        let metadata = record.metadata.as_ref().filter(|v| !v.is_null()).map(|raw| {
            let (meta, problems) = CardMetadata::parse(&record.id, raw);
            for problem in problems {
                warn!(card_id = %record.id, "{problem}; treating field as absent");
            }
            meta
        });

        Self {
            id: record.id,
            card_type: record.card_type,
            title: record.title,
            description: record.description,
            metadata,
            priority: record.priority,
            order_index: record.order_index,
        }
    }

    /// Convert back to the catalog's storage shape.
    pub fn to_record(&self) -> CardRecord {
        CardRecord {
            id: self.id.clone(),
            card_type: self.card_type.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            metadata: self.metadata.as_ref().map(|m| m.raw.clone()),
            priority: self.priority,
            order_index: self.order_index,
        }
    }

    /// Forbidden words declared in metadata (empty when none).
    pub fn forbidden_words(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.forbidden_words.as_slice())
            .unwrap_or(&[])
    }

    /// Author-declared source trust, if any.
    pub fn declared_confidence(&self) -> Option<u8> {
        self.metadata.as_ref().and_then(|m| m.declared_confidence)
    }
}

// ── Per-turn views ────────────────────────────────────────────────────────

/// Fidelity at which a card's content is materialized for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Description, metadata, and priority.
    Full,
    /// First 500 characters of the description.
    Excerpt,
    /// Title only.
    TitleOnly,
}

impl Tier {
    /// Select the tier for a relevance score.
    pub fn for_relevance(relevance: u8) -> Self {
        if relevance >= FULL_TIER_MIN {
            Self::Full
        } else if relevance >= EXCERPT_TIER_MIN {
            Self::Excerpt
        } else {
            Self::TitleOnly
        }
    }
}

/// A card rendered for this turn's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedCard {
    pub card_id: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub title: String,
    /// 0–100.
    pub relevance: u8,
    pub tier: Tier,
    pub content: String,
}

/// A heuristic indication that a card influenced a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub card_id: String,
    pub card_type: CardType,
    pub excerpts: Vec<String>,
    /// 0–100.
    pub confidence: u8,
}
