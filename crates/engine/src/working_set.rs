//! Working-set maintenance: which cards stay active after a turn.
//!
//! The new active set is the ordered, duplicate-free union of
//! 1. cards cited this turn,
//! 2. previously active cards cited anywhere in the decay window,
//! 3. cards loaded this turn at or above the high-relevance threshold.
//!
//! Anything else is evicted. The decay window is counted in raw persisted
//! messages (user and assistant) and is read before this turn's assistant
//! message is written, so it includes the current user message.

use cardwise_core::card::{Citation, LoadedCard};
use cardwise_core::message::Message;
use std::collections::HashSet;

/// Compute the new active set.
pub fn update_active_set(
    current_citations: &[Citation],
    previous_active: &[String],
    recent_citation_sets: &[Vec<String>],
    high_relevance_loaded: &[String],
) -> Vec<String> {
    let recently_cited: HashSet<&str> = recent_citation_sets
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    let cited_now = current_citations.iter().map(|c| c.card_id.as_str());
    let retained = previous_active
        .iter()
        .map(String::as_str)
        .filter(|id| recently_cited.contains(id));
    let strong = high_relevance_loaded.iter().map(String::as_str);

    let mut seen = HashSet::new();
    cited_now
        .chain(retained)
        .chain(strong)
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Citation id sets of the last `window` messages, oldest first.
pub fn recent_citation_sets(messages: &[Message], window: usize) -> Vec<Vec<String>> {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .map(Message::cited_card_ids)
        .collect()
}

/// Ids of loaded cards with relevance at or above `threshold`, in load order.
pub fn high_relevance_ids(loaded: &[LoadedCard], threshold: u8) -> Vec<String> {
    loaded
        .iter()
        .filter(|c| c.relevance >= threshold)
        .map(|c| c.card_id.clone())
        .collect()
}
