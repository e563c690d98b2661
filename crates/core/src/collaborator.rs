//! Optional collaborators: intent classification and summarization.
//!
//! Both are best-effort. The engine falls back to keyword matching when the
//! classifier is absent or fails, and keeps the previous summary when the
//! summarizer fails.

use crate::card::CardType;
use crate::error::ProviderError;
use crate::intent::IntentCategory;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an external classifier proposes for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentProposal {
    pub category: IntentCategory,
    pub relevant_card_types: Vec<CardType>,
    /// 0–100.
    pub confidence: u8,
    pub reasoning: String,
}

/// Proposes an intent for a user message.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify `message` given the card types present in the catalog.
    async fn propose(
        &self,
        message: &str,
        available_types: &[CardType],
    ) -> std::result::Result<IntentProposal, ProviderError>;
}

/// Produces a short rolling summary of recent conversation history.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages` (oldest first), folding in `previous` if any.
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[Message],
    ) -> std::result::Result<String, ProviderError>;
}
