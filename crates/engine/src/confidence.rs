//! Confidence fusion: one overall answer confidence from three signals.
//!
//! Per citation: `0.5 * source trust + 0.3 * relevance + 0.2 * citation
//! strength`, averaged across citations and rounded. With no citations a
//! fixed baseline is reported instead.

use cardwise_config::ConfidenceConfig;
use cardwise_core::card::{Card, Citation};
use std::collections::{BTreeMap, HashMap};

// Weights in tenths, so blends are summed exactly in integers.
const TRUST_WEIGHT: u64 = 5;
const RELEVANCE_WEIGHT: u64 = 3;
const CITATION_WEIGHT: u64 = 2;

/// Fuse with the default baselines (65 / 50) and defaults (70 / 50).
pub fn fuse_confidence(
    citations: &[Citation],
    relevance: &BTreeMap<String, u8>,
    catalog: &[Card],
    has_knowledge_base: bool,
) -> u8 {
    fuse_confidence_with(
        citations,
        relevance,
        catalog,
        has_knowledge_base,
        &ConfidenceConfig::default(),
    )
}

/// Fuse with explicit constants.
pub fn fuse_confidence_with(
    citations: &[Citation],
    relevance: &BTreeMap<String, u8>,
    catalog: &[Card],
    has_knowledge_base: bool,
    settings: &ConfidenceConfig,
) -> u8 {
    if citations.is_empty() {
        return if has_knowledge_base {
            settings.baseline_with_knowledge_base
        } else {
            settings.baseline_without_knowledge_base
        };
    }

    let trust: HashMap<&str, Option<u8>> = catalog
        .iter()
        .map(|c| (c.id.as_str(), c.declared_confidence()))
        .collect();

    let total_tenths: u64 = citations
        .iter()
        .map(|citation| {
            let declared = trust
                .get(citation.card_id.as_str())
                .copied()
                .flatten()
                .unwrap_or(settings.default_card_confidence);
            let rel = relevance
                .get(&citation.card_id)
                .copied()
                .unwrap_or(settings.default_relevance);

            TRUST_WEIGHT * u64::from(declared)
                + RELEVANCE_WEIGHT * u64::from(rel)
                + CITATION_WEIGHT * u64::from(citation.confidence)
        })
        .sum();

    // mean = total_tenths / (10 n), rounded half up
    let denominator = 10 * citations.len() as u64;
    let rounded = (2 * total_tenths + denominator) / (2 * denominator);
    rounded.min(100) as u8
}
