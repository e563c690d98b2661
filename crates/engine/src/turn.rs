//! The turn processor: one user message in, one cited answer out.
//!
//! A turn runs under its conversation's lock from the state read to the
//! compaction check, so two turns in the same conversation never interleave.
//! Turns in different conversations proceed independently.

use crate::citation::extract_citations;
use crate::compactor::{CompactionThresholds, ContextCompactor, LlmSummarizer, crossed};
use crate::confidence::fuse_confidence_with;
use crate::intent::{LlmIntentClassifier, classify_intent};
use crate::loader::load_cards_by_relevance;
use crate::prompt::{PromptBuilder, PromptInput, PromptStats};
use crate::working_set::{high_relevance_ids, recent_citation_sets, update_active_set};
use cardwise_config::{AppConfig, ConfidenceConfig};
use cardwise_core::card::{Citation, LoadedCard};
use cardwise_core::collaborator::{IntentClassifier, Summarizer};
use cardwise_core::error::EngineError;
use cardwise_core::intent::Intent;
use cardwise_core::message::{ConversationId, ConversationState, Message, NewConversation, TurnCommit};
use cardwise_core::provider::{Provider, ProviderRequest, Usage};
use cardwise_core::store::{CardCatalog, ConversationStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

// ── Settings ──────────────────────────────────────────────────────────────

/// Per-turn knobs, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Decay window `W`, in raw persisted messages.
    pub decay_window: usize,
    /// Loaded cards at or above this relevance stay active.
    pub high_relevance: u8,
    /// Prior messages replayed into the prompt, before the token budget.
    pub history_messages: usize,
    pub compaction_enabled: bool,
    pub confidence: ConfidenceConfig,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
            decay_window: 10,
            high_relevance: 80,
            history_messages: 20,
            compaction_enabled: true,
            confidence: ConfidenceConfig::default(),
        }
    }
}

impl From<&AppConfig> for TurnSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: Some(config.provider.max_tokens),
            decay_window: config.working_set.decay_window,
            high_relevance: config.working_set.high_relevance,
            history_messages: config.prompt.history_messages,
            compaction_enabled: config.compaction.enabled,
            confidence: config.confidence.clone(),
        }
    }
}

// ── Conversation locks ────────────────────────────────────────────────────

/// Idle locks are pruned once the map grows past this many entries.
const DEFAULT_PRUNE_THRESHOLD: usize = 1024;

/// One async lock per conversation, created on first use.
///
/// Entries no turn holds or waits on are dropped whenever the map passes
/// the prune threshold, so memory tracks active conversations.
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
    prune_threshold: usize,
}

impl Default for ConversationLocks {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold.max(1);
        self
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: &ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() >= self.prune_threshold && !locks.contains_key(id) {
                let before = locks.len();
                // The map holds one reference; any other is a guard or a waiter.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                debug!(pruned = before - locks.len(), remaining = locks.len(), "Pruned idle conversation locks");
            }
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of conversations currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────

/// Everything a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The persisted assistant message.
    pub message: Message,
    pub citations: Vec<Citation>,
    pub confidence: u8,
    pub intent: Intent,
    pub loaded: Vec<LoadedCard>,
    pub active_card_ids: Vec<String>,
    /// Whether a new summary was written this turn.
    pub compacted: bool,
    pub usage: Option<Usage>,
    pub prompt: PromptStats,
}

// ── Processor ─────────────────────────────────────────────────────────────

/// Runs turns end-to-end over the collaborator traits.
pub struct TurnProcessor {
    catalog: Arc<dyn CardCatalog>,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn Provider>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    compactor: ContextCompactor,
    prompt: PromptBuilder,
    settings: TurnSettings,
    locks: ConversationLocks,
}

impl TurnProcessor {
    /// A processor with keyword-only intent and no summarizer.
    pub fn new(
        catalog: Arc<dyn CardCatalog>,
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            catalog,
            store,
            provider,
            classifier: None,
            compactor: ContextCompactor::new(CompactionThresholds::default()),
            prompt: PromptBuilder::new(
                "You are a helpful assistant for this business. Answer from the knowledge cards when they apply.",
                1500,
            ),
            settings: TurnSettings::default(),
            locks: ConversationLocks::new(),
        }
    }

    /// Build a processor from configuration.
    ///
    /// `provider` should already carry the retry and rate-limit wrapper; the
    /// classifier and summarizer share it with their own models.
    pub fn from_config(
        config: &AppConfig,
        catalog: Arc<dyn CardCatalog>,
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let mut processor = Self::new(catalog, store, provider.clone())
            .with_settings(TurnSettings::from(config))
            .with_prompt(PromptBuilder::from_config(&config.prompt))
            .with_compaction(CompactionThresholds::from(&config.compaction));

        if config.classifier.enabled {
            processor = processor.with_classifier(Arc::new(
                LlmIntentClassifier::new(provider.clone(), config.classifier_model())
                    .with_temperature(config.classifier.temperature),
            ));
        }
        if config.summarizer.enabled {
            processor = processor.with_summarizer(Arc::new(
                LlmSummarizer::new(provider, config.summarizer_model())
                    .with_temperature(config.summarizer.temperature),
            ));
        }
        processor
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.compactor = self.compactor.with_summarizer(summarizer);
        self
    }

    /// Replace the compaction cadence, keeping any summarizer.
    pub fn with_compaction(mut self, thresholds: CompactionThresholds) -> Self {
        self.compactor = self.compactor.with_thresholds(thresholds);
        self
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Open a new conversation in the backing store.
    pub async fn start_conversation(
        &self,
        new: NewConversation,
    ) -> Result<ConversationState, EngineError> {
        let state = self.store.create_conversation(new).await?;
        info!(
            conversation_id = %state.id,
            business_id = %state.business_id,
            has_knowledge_base = state.has_knowledge_base,
            "Conversation started"
        );
        Ok(state)
    }

    /// Process one user message.
    ///
    /// On `GenerationFailed` the user message stays persisted and nothing
    /// else changes. Classification and summarization problems degrade
    /// silently to their fallbacks.
    pub async fn process_turn(
        &self,
        id: &ConversationId,
        user_message: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let _guard = self.locks.acquire(id).await;

        let state = self.store.state(id).await?;
        let catalog = self.catalog.cards(&state.business_id).await?;
        info!(
            conversation_id = %id,
            cards = catalog.len(),
            message_count = state.message_count,
            "Processing turn"
        );

        let user = self.store.append_user_message(id, user_message).await?;

        // ── Intent and loading ──
        let intent = classify_intent(user_message, &catalog, self.classifier.as_deref()).await;
        let (loaded, relevance) = load_cards_by_relevance(&catalog, &intent);
        debug!(
            conversation_id = %id,
            category = %intent.category,
            source = ?intent.source,
            intent_confidence = intent.confidence,
            "Intent resolved"
        );

        // ── Prompt ──
        let window = self.settings.decay_window.max(self.settings.history_messages + 1);
        let recent = self.store.recent_messages(id, window).await?;
        let prior = match recent.last() {
            Some(last) if last.id == user.id => &recent[..recent.len() - 1],
            _ => &recent[..],
        };
        let history = &prior[prior.len().saturating_sub(self.settings.history_messages)..];

        let assembled = self.prompt.build(&PromptInput {
            loaded_cards: &loaded,
            summary: state.context_summary.as_deref(),
            history,
            user_message,
        });

        // ── Generation ──
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: assembled.messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    conversation_id = %id,
                    provider = self.provider.name(),
                    error = %e,
                    "Generation failed, turn aborted"
                );
                return Err(EngineError::GenerationFailed(e));
            }
        };

        // ── Evidence ──
        let citations = extract_citations(&response.content, &loaded, &catalog);
        let confidence = fuse_confidence_with(
            &citations,
            &relevance,
            &catalog,
            state.has_knowledge_base,
            &self.settings.confidence,
        );

        let active_card_ids = update_active_set(
            &citations,
            &state.active_card_ids,
            &recent_citation_sets(&recent, self.settings.decay_window),
            &high_relevance_ids(&loaded, self.settings.high_relevance),
        );

        // ── Commit ──
        let message = self
            .store
            .commit_turn(
                id,
                TurnCommit {
                    content: response.content,
                    citations: citations.clone(),
                    confidence,
                    active_card_ids: active_card_ids.clone(),
                },
            )
            .await?;

        info!(
            conversation_id = %id,
            citations = citations.len(),
            confidence,
            active_cards = active_card_ids.len(),
            sequence_number = message.sequence_number,
            "Turn committed"
        );

        // ── Compaction ──
        let compacted = self.settings.compaction_enabled
            && crossed(
                state.message_count,
                message.sequence_number,
                self.compactor.thresholds(),
            )
            && self
                .compactor
                .compact(
                    self.store.as_ref(),
                    id,
                    message.sequence_number,
                    state.context_summary.as_deref(),
                )
                .await;

        Ok(TurnOutcome {
            message,
            citations,
            confidence,
            intent,
            loaded,
            active_card_ids,
            compacted,
            usage: response.usage,
            prompt: assembled.stats,
        })
    }
}
