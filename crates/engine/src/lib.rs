//! # Cardwise Engine
//!
//! The context-budget and working-set engine. Per turn:
//!
//! ```text
//! message -> classify -> score -> load tiers -> prompt + generate
//!         -> extract citations -> fuse confidence -> update working set
//!         -> maybe compact
//! ```
//!
//! Every step except generation is a pure function or best-effort, and can
//! be used on its own. [`TurnProcessor`] wires them over the collaborator
//! traits from `cardwise-core`.

pub mod citation;
pub mod compactor;
pub mod confidence;
pub mod intent;
pub mod loader;
pub mod prompt;
pub mod relevance;
pub mod token;
pub mod turn;
pub mod working_set;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use citation::extract_citations;
pub use compactor::{CompactionThresholds, ContextCompactor, LlmSummarizer, crossed, maybe_compact};
pub use confidence::{fuse_confidence, fuse_confidence_with};
pub use intent::{LlmIntentClassifier, classify_intent, keyword_intent};
pub use loader::load_cards_by_relevance;
pub use prompt::{PromptBuilder, PromptInput, PromptStats};
pub use relevance::score_relevance;
pub use turn::{ConversationLocks, TurnOutcome, TurnProcessor, TurnSettings};
pub use working_set::update_active_set;
