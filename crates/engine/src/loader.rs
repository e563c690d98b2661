//! Tiered content loading.
//!
//! Every catalog card yields exactly one [`LoadedCard`]. Low relevance only
//! shrinks what is rendered; no card is ever dropped.

use crate::relevance::score_relevance;
use cardwise_core::card::{Card, LoadedCard, Tier};
use cardwise_core::intent::Intent;
use std::collections::BTreeMap;

/// Characters of description kept at the excerpt tier.
pub const EXCERPT_CHARS: usize = 500;

/// Marker appended when an excerpt was cut.
pub const ELLIPSIS: &str = "...";

/// Score the catalog and render each card at the tier its relevance selects.
///
/// Output order follows the catalog. Identical inputs give identical output.
pub fn load_cards_by_relevance(
    catalog: &[Card],
    intent: &Intent,
) -> (Vec<LoadedCard>, BTreeMap<String, u8>) {
    let relevance = score_relevance(intent, catalog);

    let loaded = catalog
        .iter()
        .map(|card| {
            let score = relevance.get(&card.id).copied().unwrap_or_default();
            load_card(card, score)
        })
        .collect();

    (loaded, relevance)
}

/// Render one card at the tier for `relevance`.
pub fn load_card(card: &Card, relevance: u8) -> LoadedCard {
    let tier = Tier::for_relevance(relevance);
    let content = match tier {
        Tier::Full => render_full(card),
        Tier::Excerpt => excerpt(&card.description),
        Tier::TitleOnly => card.title.clone(),
    };

    LoadedCard {
        card_id: card.id.clone(),
        card_type: card.card_type.clone(),
        title: card.title.clone(),
        relevance,
        tier,
        content,
    }
}

fn render_full(card: &Card) -> String {
    let mut parts = Vec::with_capacity(3);
    if !card.description.is_empty() {
        parts.push(card.description.clone());
    }
    if let Some(meta) = &card.metadata {
        let rendered = serde_json::to_string(&meta.raw).unwrap_or_default();
        if !rendered.is_empty() && rendered != "null" {
            parts.push(format!("Metadata: {rendered}"));
        }
    }
    if let Some(priority) = card.priority {
        parts.push(format!("Priority: {priority}"));
    }
    parts.join("\n")
}

/// First [`EXCERPT_CHARS`] characters, with [`ELLIPSIS`] only if longer.
pub fn excerpt(description: &str) -> String {
    match description.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &description[..cut]),
        None => description.to_string(),
    }
}
