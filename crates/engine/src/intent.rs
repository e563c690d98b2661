//! Intent classification with a deterministic keyword fallback.
//!
//! The primary path asks an [`IntentClassifier`] collaborator for a
//! proposal and resolves its card types against the catalog. Whenever the
//! collaborator is absent or fails, [`keyword_intent`] answers instead, so
//! classification itself never fails.

use async_trait::async_trait;
use cardwise_core::card::{Card, CardType};
use cardwise_core::collaborator::{IntentClassifier, IntentProposal};
use cardwise_core::error::{EngineError, ProviderError};
use cardwise_core::intent::{Intent, IntentCategory, IntentSource};
use cardwise_core::provider::{ChatMessage, Provider, ProviderRequest};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence reported by the fallback when no keyword matched.
const NO_MATCH_CONFIDENCE: u8 = 50;

/// Classify `message` against `catalog`.
pub async fn classify_intent(
    message: &str,
    catalog: &[Card],
    classifier: Option<&dyn IntentClassifier>,
) -> Intent {
    let Some(classifier) = classifier else {
        debug!("No intent classifier configured, using keyword fallback");
        return keyword_intent(message, catalog);
    };

    let available = available_types(catalog);
    match classifier.propose(message, &available).await {
        Ok(proposal) => intent_from_proposal(proposal, catalog),
        Err(e) => {
            let err = EngineError::ClassificationUnavailable(e.to_string());
            warn!(error = %err, "Falling back to keyword intent");
            keyword_intent(message, catalog)
        }
    }
}

/// Distinct card types in catalog order.
pub fn available_types(catalog: &[Card]) -> Vec<CardType> {
    let mut seen = BTreeSet::new();
    catalog
        .iter()
        .filter(|c| seen.insert(c.card_type.clone()))
        .map(|c| c.card_type.clone())
        .collect()
}

fn intent_from_proposal(proposal: IntentProposal, catalog: &[Card]) -> Intent {
    let relevant_card_ids = catalog
        .iter()
        .filter(|c| proposal.relevant_card_types.contains(&c.card_type))
        .map(|c| c.id.clone())
        .collect();

    debug!(
        category = %proposal.category,
        confidence = proposal.confidence,
        "Classifier proposed intent"
    );

    Intent {
        category: proposal.category,
        relevant_card_ids,
        confidence: proposal.confidence.min(100),
        reasoning: proposal.reasoning,
        source: IntentSource::Classifier,
    }
}

// ── Keyword fallback ──────────────────────────────────────────────────────

/// Deterministic keyword classification.
///
/// Each category counts how many of its keywords occur in the message as
/// whole words (a trailing plural `s` is accepted). The highest count wins;
/// ties go to the category declared first. Confidence is
/// `min(60 + 5 * hits, 90)`, or 50 with category `general` when nothing hit.
pub fn keyword_intent(message: &str, catalog: &[Card]) -> Intent {
    let haystack = normalize(message);

    let mut best = (IntentCategory::General, 0usize);
    for category in IntentCategory::ALL {
        let hits = category
            .keywords()
            .iter()
            .filter(|kw| contains_phrase(&haystack, kw))
            .count();
        if hits > best.1 {
            best = (category, hits);
        }
    }

    let (category, hits) = best;
    let confidence = if hits > 0 {
        (60 + hits * 5).min(90) as u8
    } else {
        NO_MATCH_CONFIDENCE
    };

    let relevant_card_ids = catalog
        .iter()
        .filter(|c| category.covers(&c.card_type))
        .map(|c| c.id.clone())
        .collect();

    Intent {
        category,
        relevant_card_ids,
        confidence,
        reasoning: if hits > 0 {
            format!("{hits} keyword match(es) for {category}")
        } else {
            "no category keywords matched".into()
        },
        source: IntentSource::KeywordFallback,
    }
}

/// Lowercase, collapse non-alphanumerics to single spaces, pad both ends.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    if out.len() == 1 {
        out.push(' ');
    }
    out
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.contains(&format!(" {phrase} ")) || haystack.contains(&format!(" {phrase}s "))
}

// ── Provider-backed classifier ────────────────────────────────────────────

/// An [`IntentClassifier`] that asks a text-generation provider for JSON.
pub struct LlmIntentClassifier {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl LlmIntentClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn system_prompt(available: &[CardType]) -> String {
        let categories: Vec<&str> = IntentCategory::ALL.iter().map(|c| c.as_str()).collect();
        let types: Vec<&str> = available.iter().map(|t| t.as_str()).collect();
        format!(
            "Classify the user's message for a business assistant.\n\
             Categories: {}.\n\
             Knowledge card types available: {}.\n\
             Reply with only a JSON object: \
             {{\"category\": string, \"relevantCardTypes\": [string], \
             \"confidence\": integer 0-100, \"reasoning\": string}}.",
            categories.join(", "),
            if types.is_empty() { "none".to_string() } else { types.join(", ") },
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProposal {
    #[serde(default)]
    category: String,
    #[serde(default, alias = "relevant_card_types")]
    relevant_card_types: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: String,
}

/// Parse a classifier reply, tolerating prose or code fences around the JSON.
pub fn parse_proposal(reply: &str) -> Result<IntentProposal, ProviderError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| ProviderError::MalformedOutput("no JSON object in classifier reply".into()))?;
    let raw: RawProposal = serde_json::from_str(json)
        .map_err(|e| ProviderError::MalformedOutput(format!("classifier JSON: {e}")))?;

    Ok(IntentProposal {
        category: IntentCategory::parse_lenient(&raw.category),
        relevant_card_types: raw
            .relevant_card_types
            .iter()
            .map(|t| CardType::from(t.as_str()))
            .collect(),
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(NO_MATCH_CONFIDENCE),
        reasoning: raw.reasoning,
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn propose(
        &self,
        message: &str,
        available_types: &[CardType],
    ) -> Result<IntentProposal, ProviderError> {
        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(Self::system_prompt(available_types)),
                ChatMessage::user(message),
            ],
        );
        request.temperature = self.temperature;
        request.max_tokens = Some(300);

        let response = self.provider.complete(request).await?;
        parse_proposal(&response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{card, ScriptedProvider, StubClassifier};

    fn catalog() -> Vec<Card> {
        vec![
            card("overview", CardType::BusinessOverview, "About Us", "We roast coffee."),
            card("voice", CardType::BrandVoice, "Brand Voice", "Friendly and warm."),
            card("products", CardType::ProductsServices, "Products", "Beans and gear."),
            card("rules", CardType::ComplianceRules, "Compliance", "No health claims."),
            card("setup", CardType::TechnicalSetup, "Setup", "Shopify store."),
        ]
    }

    #[test]
    fn fallback_picks_category_with_most_hits() {
        let intent = keyword_intent("Write a blog post about our new product", &catalog());
        // content_generation: write, blog, post = 3; business_info: about, product = 2
        assert_eq!(intent.category, IntentCategory::ContentGeneration);
        assert_eq!(intent.confidence, 75);
        assert_eq!(intent.source, IntentSource::KeywordFallback);
        assert_eq!(intent.relevant_card_ids, BTreeSet::from(["voice".to_string()]));
    }

    #[test]
    fn fallback_ties_favor_first_declared_category() {
        // one hit each: email, about, policy
        let intent = keyword_intent("email about the policy", &catalog());
        assert_eq!(intent.category, IntentCategory::ContentGeneration);
        assert_eq!(intent.confidence, 65);
    }

    #[test]
    fn fallback_confidence_caps_at_90() {
        let intent = keyword_intent(
            "legal compliance regulation disclaimer policy privacy terms gdpr",
            &catalog(),
        );
        assert_eq!(intent.category, IntentCategory::Compliance);
        assert_eq!(intent.confidence, 90);
        assert_eq!(intent.relevant_card_ids, BTreeSet::from(["rules".to_string()]));
    }

    #[test]
    fn fallback_without_hits_is_general_50() {
        let intent = keyword_intent("hello there!", &catalog());
        assert_eq!(intent.category, IntentCategory::General);
        assert_eq!(intent.confidence, 50);
        assert_eq!(intent.relevant_card_ids, BTreeSet::from(["overview".to_string()]));
    }

    #[test]
    fn fallback_matches_whole_words_and_plurals() {
        // "rapid" must not count as "api"; "products" counts as "product"
        let intent = keyword_intent("rapid questions about products", &catalog());
        assert_eq!(intent.category, IntentCategory::BusinessInfo);
        assert_eq!(intent.confidence, 70);
    }

    #[test]
    fn fallback_matches_multi_word_keyword() {
        let intent = keyword_intent("How do I set up my store?", &catalog());
        assert_eq!(intent.category, IntentCategory::TechnicalSetup);
    }

    #[test]
    fn empty_message_is_general() {
        let intent = keyword_intent("", &[]);
        assert_eq!(intent.category, IntentCategory::General);
        assert!(intent.relevant_card_ids.is_empty());
    }

    #[tokio::test]
    async fn classifier_types_resolve_to_catalog_ids() {
        let classifier = StubClassifier::proposing(IntentProposal {
            category: IntentCategory::BusinessInfo,
            relevant_card_types: vec![CardType::ProductsServices, CardType::Faq],
            confidence: 88,
            reasoning: "asks about products".into(),
        });

        let intent = classify_intent("what do you sell?", &catalog(), Some(&classifier)).await;
        assert_eq!(intent.source, IntentSource::Classifier);
        assert_eq!(intent.category, IntentCategory::BusinessInfo);
        assert_eq!(intent.confidence, 88);
        assert_eq!(intent.relevant_card_ids, BTreeSet::from(["products".to_string()]));
    }

    #[tokio::test]
    async fn classifier_receives_available_types() {
        let classifier = StubClassifier::proposing(IntentProposal {
            category: IntentCategory::General,
            relevant_card_types: vec![],
            confidence: 40,
            reasoning: String::new(),
        });
        classify_intent("hi", &catalog(), Some(&classifier)).await;
        let seen = classifier.seen_types();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], CardType::BusinessOverview);
    }

    #[tokio::test]
    async fn classifier_failure_uses_fallback() {
        let classifier = StubClassifier::failing(ProviderError::Timeout("slow".into()));
        let intent = classify_intent("Write a tweet", &catalog(), Some(&classifier)).await;
        assert_eq!(intent.source, IntentSource::KeywordFallback);
        assert_eq!(intent.category, IntentCategory::ContentGeneration);
    }

    #[tokio::test]
    async fn missing_classifier_uses_fallback() {
        let intent = classify_intent("pricing?", &catalog(), None).await;
        assert_eq!(intent.source, IntentSource::KeywordFallback);
        assert_eq!(intent.category, IntentCategory::BusinessInfo);
    }

    #[test]
    fn parse_proposal_tolerates_fences() {
        let reply = "Sure!\n```json\n{\"category\": \"compliance\", \"relevantCardTypes\": [\"COMPLIANCE_RULES\"], \"confidence\": 91.6, \"reasoning\": \"asks about claims\"}\n```";
        let proposal = parse_proposal(reply).unwrap();
        assert_eq!(proposal.category, IntentCategory::Compliance);
        assert_eq!(proposal.relevant_card_types, vec![CardType::ComplianceRules]);
        assert_eq!(proposal.confidence, 92);
    }

    #[test]
    fn parse_proposal_clamps_and_defaults() {
        let proposal = parse_proposal(
            r#"{"category": "astrology", "relevant_card_types": ["MYSTERY"], "confidence": 250}"#,
        )
        .unwrap();
        assert_eq!(proposal.category, IntentCategory::General);
        assert_eq!(proposal.relevant_card_types, vec![CardType::Other("MYSTERY".into())]);
        assert_eq!(proposal.confidence, 100);
    }

    #[test]
    fn parse_proposal_rejects_prose() {
        assert!(matches!(
            parse_proposal("I think it's about pricing."),
            Err(ProviderError::MalformedOutput(_))
        ));
    }

    #[tokio::test]
    async fn llm_classifier_sends_types_and_parses_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            r#"{"category": "business_info", "relevantCardTypes": ["PRODUCTS_SERVICES"], "confidence": 80, "reasoning": "products"}"#,
        ]));
        let classifier = LlmIntentClassifier::new(provider.clone(), "classifier-model");

        let proposal = classifier
            .propose("what do you sell", &[CardType::ProductsServices])
            .await
            .unwrap();
        assert_eq!(proposal.category, IntentCategory::BusinessInfo);

        let requests = provider.requests();
        assert_eq!(requests[0].model, "classifier-model");
        assert!(requests[0].messages[0].content.contains("PRODUCTS_SERVICES"));
    }
}
