//! Periodic history compaction into a single rolling summary.
//!
//! Compaction runs when the message count first reaches the threshold and
//! afterwards on exact multiples of the interval. It is best-effort: a
//! failing or missing summarizer leaves the previous summary in place and
//! never fails the turn.

use async_trait::async_trait;
use cardwise_config::CompactionConfig;
use cardwise_core::collaborator::Summarizer;
use cardwise_core::error::{EngineError, ProviderError};
use cardwise_core::message::{ConversationId, Message, Role};
use cardwise_core::provider::{ChatMessage, Provider, ProviderRequest};
use cardwise_core::store::ConversationStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Compaction cadence and history cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionThresholds {
    /// First count that triggers compaction (`T`).
    pub threshold: u64,
    /// Spacing of later triggers (`I`); never zero.
    pub interval: u64,
    /// Most messages handed to the summarizer.
    pub history_cap: usize,
}

impl Default for CompactionThresholds {
    fn default() -> Self {
        Self {
            threshold: 10,
            interval: 5,
            history_cap: 20,
        }
    }
}

impl From<&CompactionConfig> for CompactionThresholds {
    fn from(config: &CompactionConfig) -> Self {
        Self {
            threshold: config.threshold,
            interval: config.interval.max(1),
            history_cap: config.history_cap,
        }
    }
}

/// Whether a conversation at `message_count` is due for compaction.
pub fn maybe_compact(message_count: u64, thresholds: &CompactionThresholds) -> bool {
    let interval = thresholds.interval.max(1);
    message_count == thresholds.threshold
        || (message_count > thresholds.threshold && message_count % interval == 0)
}

/// Whether any count in `(previous, current]` is due.
///
/// A turn appends two messages, so a trigger landing on the user message
/// would otherwise be skipped.
pub fn crossed(previous: u64, current: u64, thresholds: &CompactionThresholds) -> bool {
    (previous.saturating_add(1)..=current).any(|count| maybe_compact(count, thresholds))
}

/// Runs compaction against a conversation store.
pub struct ContextCompactor {
    summarizer: Option<Arc<dyn Summarizer>>,
    thresholds: CompactionThresholds,
}

impl ContextCompactor {
    pub fn new(thresholds: CompactionThresholds) -> Self {
        Self {
            summarizer: None,
            thresholds,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_thresholds(mut self, thresholds: CompactionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &CompactionThresholds {
        &self.thresholds
    }

    /// Summarize recent history and replace the summary slot.
    ///
    /// Returns `true` when a new summary was written.
    pub async fn compact(
        &self,
        store: &dyn ConversationStore,
        id: &ConversationId,
        message_count: u64,
        previous_summary: Option<&str>,
    ) -> bool {
        match self.try_compact(store, id, message_count, previous_summary).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Compaction skipped, keeping previous summary");
                false
            }
        }
    }

    async fn try_compact(
        &self,
        store: &dyn ConversationStore,
        id: &ConversationId,
        message_count: u64,
        previous_summary: Option<&str>,
    ) -> Result<(), EngineError> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| EngineError::SummarizationFailed("no summarizer configured".into()))?;

        let limit = usize::try_from(message_count)
            .unwrap_or(usize::MAX)
            .min(self.thresholds.history_cap);
        let history = store.recent_messages(id, limit).await?;

        let summary = summarizer
            .summarize(previous_summary, &history)
            .await
            .map_err(|e| EngineError::SummarizationFailed(e.to_string()))?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(EngineError::SummarizationFailed("summarizer returned empty text".into()));
        }

        store.replace_summary(id, summary).await?;
        info!(
            conversation_id = %id,
            message_count,
            messages_summarized = history.len(),
            "Context compacted"
        );
        Ok(())
    }
}

// ── Provider-backed summarizer ────────────────────────────────────────────

/// A [`Summarizer`] that asks a text-generation provider.
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 400,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn transcript(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[Message],
    ) -> Result<String, ProviderError> {
        let mut prompt = String::new();
        if let Some(previous) = previous.filter(|p| !p.trim().is_empty()) {
            prompt.push_str("Summary so far:\n");
            prompt.push_str(previous);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&Self::transcript(messages));

        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(
                    "Write a short rolling summary of this conversation: the topics \
                     discussed and any decisions made. Fold in the existing summary. \
                     Reply with the summary only, at most a few sentences.",
                ),
                ChatMessage::user(prompt),
            ],
        );
        request.temperature = self.temperature;
        request.max_tokens = Some(self.max_tokens);

        debug!(model = %self.model, messages = messages.len(), "Requesting summary");
        let response = self.provider.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, StubSummarizer};
    use cardwise_core::message::NewConversation;
    use cardwise_store::InMemoryStore;

    fn defaults() -> CompactionThresholds {
        CompactionThresholds::default()
    }

    #[test]
    fn cadence_matches_threshold_then_interval() {
        let t = defaults();
        assert!(!maybe_compact(9, &t));
        assert!(maybe_compact(10, &t));
        assert!(!maybe_compact(11, &t));
        assert!(!maybe_compact(14, &t));
        assert!(maybe_compact(15, &t));
        assert!(maybe_compact(20, &t));
        assert!(!maybe_compact(5, &t));
        assert!(!maybe_compact(0, &t));
    }

    #[test]
    fn transitions_trigger_as_expected() {
        let t = defaults();
        assert!(crossed(9, 10, &t));
        assert!(!crossed(10, 11, &t));
        assert!(crossed(14, 15, &t));
    }

    #[test]
    fn two_message_turn_does_not_skip_trigger() {
        let t = defaults();
        // user message lands on 10, assistant on 11
        assert!(crossed(9, 11, &t));
        assert!(!crossed(11, 13, &t));
        assert!(crossed(13, 15, &t));
        assert!(!crossed(10, 10, &t));
    }

    #[test]
    fn thresholds_from_config_guard_zero_interval() {
        let config = CompactionConfig {
            interval: 0,
            ..Default::default()
        };
        assert_eq!(CompactionThresholds::from(&config).interval, 1);
    }

    async fn seeded_store(messages: usize) -> (InMemoryStore, ConversationId) {
        let store = InMemoryStore::new();
        let id = store
            .create_conversation(NewConversation {
                id: None,
                business_id: "biz".into(),
                has_knowledge_base: true,
            })
            .await
            .unwrap()
            .id;
        for i in 0..messages {
            store.append_user_message(&id, &format!("message {i}")).await.unwrap();
        }
        (store, id)
    }

    #[tokio::test]
    async fn compaction_replaces_summary_with_capped_history() {
        let (store, id) = seeded_store(25).await;
        let summarizer = Arc::new(StubSummarizer::returning("Discussed 25 things."));
        let compactor = ContextCompactor::new(defaults()).with_summarizer(summarizer.clone());

        assert!(compactor.compact(&store, &id, 25, Some("old")).await);

        let state = store.state(&id).await.unwrap();
        assert_eq!(state.context_summary.as_deref(), Some("Discussed 25 things."));
        assert_eq!(summarizer.seen_lengths(), vec![20]);
        assert_eq!(summarizer.seen_previous(), vec![Some("old".to_string())]);
    }

    #[tokio::test]
    async fn history_limited_by_message_count() {
        let (store, id) = seeded_store(4).await;
        let summarizer = Arc::new(StubSummarizer::returning("short"));
        let compactor = ContextCompactor::new(defaults()).with_summarizer(summarizer.clone());

        compactor.compact(&store, &id, 4, None).await;
        assert_eq!(summarizer.seen_lengths(), vec![4]);
    }

    #[tokio::test]
    async fn failure_keeps_previous_summary() {
        let (store, id) = seeded_store(10).await;
        store.replace_summary(&id, "kept").await.unwrap();
        let compactor = ContextCompactor::new(defaults())
            .with_summarizer(Arc::new(StubSummarizer::failing()));

        assert!(!compactor.compact(&store, &id, 10, Some("kept")).await);
        assert_eq!(store.state(&id).await.unwrap().context_summary.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn empty_summary_is_rejected() {
        let (store, id) = seeded_store(10).await;
        let compactor = ContextCompactor::new(defaults())
            .with_summarizer(Arc::new(StubSummarizer::returning("   ")));

        assert!(!compactor.compact(&store, &id, 10, None).await);
        assert!(store.state(&id).await.unwrap().context_summary.is_none());
    }

    #[tokio::test]
    async fn missing_summarizer_is_a_no_op() {
        let (store, id) = seeded_store(10).await;
        let compactor = ContextCompactor::new(defaults());
        assert!(!compactor.compact(&store, &id, 10, None).await);
    }

    #[tokio::test]
    async fn llm_summarizer_includes_previous_summary_and_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec!["  New summary.  "]));
        let summarizer = LlmSummarizer::new(provider.clone(), "sum-model");
        let messages = vec![Message::user("What are your hours?", 1)];

        let out = summarizer.summarize(Some("Asked about pricing."), &messages).await.unwrap();
        assert_eq!(out, "New summary.");

        let request = &provider.requests()[0];
        assert_eq!(request.model, "sum-model");
        let body = &request.messages[1].content;
        assert!(body.contains("Summary so far:\nAsked about pricing."));
        assert!(body.contains("User: What are your hours?"));
    }
}
