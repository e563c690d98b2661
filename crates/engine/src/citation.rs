//! Heuristic citation extraction.
//!
//! Decides which loaded cards a generated answer drew on, using textual
//! evidence only. Strength per card starts at 0:
//!
//! - **+30** when the card's title, its type with underscores as spaces, or
//!   its raw type string occurs in the answer (case-insensitive, first match
//!   wins). A window of 50 characters each side is kept as the excerpt.
//! - Full-tier cards only: **+20** when the card declares forbidden words and
//!   the answer avoids a strict majority of them.
//! - Full-tier cards only: **+10** when the answer addresses the reader
//!   directly and the card is about style: a `BRAND_VOICE_CARD`, or any card
//!   whose loaded content mentions voice, tone or style.
//!
//! A card is cited once its strength reaches 30.
//!
//! # Known character
//!
//! This is a textual heuristic, not a grounding proof.
//! False positives: short titles that are common words ("Pricing", "FAQ")
//! match incidental mentions, and avoiding forbidden words is often
//! accidental. False negatives: answers that paraphrase a card without
//! naming it are never cited unless the full-tier signals add up to 30.
//! The style signal keys on card type as well as content, so a brand voice
//! card with a terse description ("Be warm.") still earns it; any other
//! card type earns it only through the marker words in its content.

use cardwise_core::card::{Card, CardType, Citation, LoadedCard, Tier};
use std::collections::HashMap;

/// Minimum strength for a citation; also the score of one textual match.
pub const CITATION_FLOOR: u32 = 30;

const MATCH_STRENGTH: u32 = 30;
const FORBIDDEN_AVOIDED_STRENGTH: u32 = 20;
const DIRECT_ADDRESS_STRENGTH: u32 = 10;
const EXCERPT_RADIUS: usize = 50;

const STYLE_MARKERS: &[&str] = &["voice", "tone", "style"];
const DIRECT_ADDRESS: &[&str] = &[
    "you", "your", "yours", "yourself", "yourselves", "you're", "you'll", "you've", "you'd",
];

/// Extract citations for every loaded card the response shows evidence of.
///
/// `catalog` resolves ids to cards for their metadata; cards missing from it
/// are still checked for textual matches.
pub fn extract_citations(
    response: &str,
    loaded: &[LoadedCard],
    catalog: &[Card],
) -> Vec<Citation> {
    let by_id: HashMap<&str, &Card> = catalog.iter().map(|c| (c.id.as_str(), c)).collect();
    let text = FoldedText::new(response);
    let direct_address = addresses_reader(response);

    loaded
        .iter()
        .filter_map(|card| {
            let mut strength = 0;
            let mut excerpts = Vec::new();

            if let Some(excerpt) = first_mention(&text, card) {
                strength += MATCH_STRENGTH;
                excerpts.push(excerpt);
            }

            if card.tier == Tier::Full {
                let forbidden = by_id
                    .get(card.card_id.as_str())
                    .map(|c| c.forbidden_words())
                    .unwrap_or(&[]);
                if avoids_majority(&text, forbidden) {
                    strength += FORBIDDEN_AVOIDED_STRENGTH;
                }
                if direct_address && references_style(card) {
                    strength += DIRECT_ADDRESS_STRENGTH;
                }
            }

            citation_from_strength(card, strength, excerpts)
        })
        .collect()
}

/// Turn an accumulated strength into a citation, if it clears the floor.
///
/// Confidence is `min(strength, 100)`; an empty excerpt list becomes
/// `[title]`.
pub fn citation_from_strength(
    card: &LoadedCard,
    strength: u32,
    excerpts: Vec<String>,
) -> Option<Citation> {
    if strength < CITATION_FLOOR {
        return None;
    }

    let excerpts = if excerpts.is_empty() {
        vec![card.title.clone()]
    } else {
        excerpts
    };

    Some(Citation {
        card_id: card.card_id.clone(),
        card_type: card.card_type.clone(),
        excerpts,
        confidence: strength.min(100) as u8,
    })
}

// ── Text helpers ──────────────────────────────────────────────────────────

/// A response with a per-character lowercase fold, index-aligned with the
/// original characters so match positions map back exactly.
struct FoldedText {
    original: Vec<char>,
    folded: Vec<char>,
}

impl FoldedText {
    fn new(text: &str) -> Self {
        let original: Vec<char> = text.chars().collect();
        let folded = original.iter().map(|c| fold(*c)).collect();
        Self { original, folded }
    }

    /// Character index of the first case-insensitive occurrence of `needle`.
    fn find(&self, needle: &str) -> Option<(usize, usize)> {
        let needle: Vec<char> = needle.chars().map(fold).collect();
        if needle.is_empty() || needle.len() > self.folded.len() {
            return None;
        }
        self.folded
            .windows(needle.len())
            .position(|w| w == needle.as_slice())
            .map(|start| (start, needle.len()))
    }

    fn contains(&self, needle: &str) -> bool {
        self.find(needle).is_some()
    }

    fn window(&self, start: usize, len: usize) -> String {
        let from = start.saturating_sub(EXCERPT_RADIUS);
        let to = (start + len + EXCERPT_RADIUS).min(self.original.len());
        self.original[from..to].iter().collect::<String>().trim().to_string()
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn first_mention(text: &FoldedText, card: &LoadedCard) -> Option<String> {
    let spaced = card.card_type.spaced();
    [card.title.trim(), spaced.as_str(), card.card_type.as_str()]
        .into_iter()
        .filter(|needle| !needle.is_empty())
        .find_map(|needle| text.find(needle))
        .map(|(start, len)| text.window(start, len))
}

fn avoids_majority(text: &FoldedText, forbidden: &[String]) -> bool {
    if forbidden.is_empty() {
        return false;
    }
    let avoided = forbidden.iter().filter(|w| !text.contains(w)).count();
    avoided * 2 > forbidden.len()
}

fn references_style(card: &LoadedCard) -> bool {
    if card.card_type == CardType::BrandVoice {
        return true;
    }
    let lower = card.content.to_lowercase();
    STYLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether the response speaks to the reader in the second person.
pub fn addresses_reader(response: &str) -> bool {
    response
        .to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .any(|w| DIRECT_ADDRESS.contains(&w))
}
