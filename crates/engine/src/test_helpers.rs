//! Shared fixtures for engine unit tests.

use async_trait::async_trait;
use cardwise_core::card::{Card, CardType};
use cardwise_core::collaborator::{IntentClassifier, IntentProposal, Summarizer};
use cardwise_core::error::ProviderError;
use cardwise_core::intent::{Intent, IntentCategory, IntentSource};
use cardwise_core::message::Message;
use cardwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;

pub fn card(id: &str, card_type: CardType, title: &str, description: &str) -> Card {
    Card {
        id: id.to_string(),
        card_type,
        title: title.to_string(),
        description: description.to_string(),
        metadata: None,
        priority: None,
        order_index: 0,
    }
}

pub fn intent(category: IntentCategory, card_ids: &[&str], confidence: u8) -> Intent {
    Intent {
        category,
        relevant_card_ids: card_ids.iter().map(|id| id.to_string()).collect::<BTreeSet<_>>(),
        confidence,
        reasoning: String::new(),
        source: IntentSource::Classifier,
    }
}

// ── Providers ─────────────────────────────────────────────────────────────

/// Replies with canned text in order and records every request.
/// Fails with `ApiError` once the script runs out.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::with_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_results(vec![Err(error)])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            })
        })?;
        Ok(ProviderResponse {
            content: reply,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────

pub struct StubClassifier {
    outcome: Result<IntentProposal, ProviderError>,
    seen: Mutex<Vec<CardType>>,
}

impl StubClassifier {
    pub fn proposing(proposal: IntentProposal) -> Self {
        Self {
            outcome: Ok(proposal),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            outcome: Err(error),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_types(&self) -> Vec<CardType> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentClassifier for StubClassifier {
    async fn propose(
        &self,
        _message: &str,
        available_types: &[CardType],
    ) -> Result<IntentProposal, ProviderError> {
        *self.seen.lock().unwrap() = available_types.to_vec();
        self.outcome.clone()
    }
}

pub struct StubSummarizer {
    reply: Option<String>,
    lengths: Mutex<Vec<usize>>,
    previous: Mutex<Vec<Option<String>>>,
}

impl StubSummarizer {
    pub fn returning(summary: &str) -> Self {
        Self {
            reply: Some(summary.to_string()),
            lengths: Mutex::new(Vec::new()),
            previous: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            lengths: Mutex::new(Vec::new()),
            previous: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_lengths(&self) -> Vec<usize> {
        self.lengths.lock().unwrap().clone()
    }

    pub fn seen_previous(&self) -> Vec<Option<String>> {
        self.previous.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[Message],
    ) -> Result<String, ProviderError> {
        self.lengths.lock().unwrap().push(messages.len());
        self.previous.lock().unwrap().push(previous.map(str::to_string));
        self.reply
            .clone()
            .ok_or_else(|| ProviderError::Timeout("summarizer unavailable".into()))
    }
}
