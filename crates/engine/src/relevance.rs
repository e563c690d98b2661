//! Relevance scoring: a pure function of intent and catalog.

use cardwise_core::card::Card;
use cardwise_core::intent::Intent;
use std::collections::BTreeMap;

/// Score assigned to cards outside the intent's category.
pub const RELEVANCE_FLOOR: u8 = 20;

/// Relevance of one card under `intent`, 0–100.
///
/// | condition | score |
/// |-----------|-------|
/// | id in `relevant_card_ids` | `min(80 + confidence/5, 100)` |
/// | type in the category's list | `40 + confidence/2` |
/// | otherwise | 20 |
pub fn score_card(intent: &Intent, card: &Card) -> u8 {
    let confidence = f64::from(intent.confidence.min(100));

    if intent.relevant_card_ids.contains(&card.id) {
        (80.0 + confidence / 5.0).round().min(100.0) as u8
    } else if intent.category.covers(&card.card_type) {
        (40.0 + confidence / 2.0).round() as u8
    } else {
        RELEVANCE_FLOOR
    }
}

/// Score every card in the catalog. Keys are card ids.
pub fn score_relevance(intent: &Intent, catalog: &[Card]) -> BTreeMap<String, u8> {
    catalog
        .iter()
        .map(|card| (card.id.clone(), score_card(intent, card)))
        .collect()
}
