//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use cardwise_core::card::{Card, CardRecord};
use cardwise_core::error::StoreError;
use cardwise_core::message::{
    ConversationId, ConversationState, Message, NewConversation, TurnCommit,
};
use cardwise_core::store::{CardCatalog, ConversationStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
struct ConversationEntry {
    state: ConversationState,
    messages: Vec<Message>,
}

/// Card catalog and conversation store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cards: Arc<RwLock<HashMap<String, Vec<Card>>>>,
    conversations: Arc<RwLock<HashMap<ConversationId, ConversationEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace cards for a business. Returns the number written.
    pub async fn insert_cards(&self, business_id: &str, records: Vec<CardRecord>) -> usize {
        let mut cards = self.cards.write().await;
        let catalog = cards.entry(business_id.to_string()).or_default();
        let written = records.len();

        for record in records {
            let card = Card::from_record(record);
            match catalog.iter_mut().find(|c| c.id == card.id) {
                Some(existing) => *existing = card,
                None => catalog.push(card),
            }
        }

        sort_catalog(catalog);
        written
    }
}

/// Catalog order: `order_index`, then id.
pub(crate) fn sort_catalog(cards: &mut [Card]) {
    cards.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl CardCatalog for InMemoryStore {
    async fn cards(&self, business_id: &str) -> Result<Vec<Card>, StoreError> {
        Ok(self
            .cards
            .read()
            .await
            .get(business_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> Result<ConversationState, StoreError> {
        let state = ConversationState::new(new);
        let mut conversations = self.conversations.write().await;

        if conversations.contains_key(&state.id) {
            return Err(StoreError::Storage(format!(
                "conversation {} already exists",
                state.id
            )));
        }

        conversations.insert(
            state.id.clone(),
            ConversationEntry {
                state: state.clone(),
                messages: Vec::new(),
            },
        );
        Ok(state)
    }

    async fn state(&self, id: &ConversationId) -> Result<ConversationState, StoreError> {
        self.conversations
            .read()
            .await
            .get(id)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    async fn append_user_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut conversations = self.conversations.write().await;
        let entry = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        entry.state.message_count += 1;
        entry.state.updated_at = Utc::now();
        let message = Message::user(content, entry.state.message_count);
        entry.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        let entry = conversations
            .get(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        let start = entry.messages.len().saturating_sub(limit);
        Ok(entry.messages[start..].to_vec())
    }

    async fn commit_turn(
        &self,
        id: &ConversationId,
        commit: TurnCommit,
    ) -> Result<Message, StoreError> {
        let mut conversations = self.conversations.write().await;
        let entry = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        entry.state.message_count += 1;
        let message = Message::assistant(
            commit.content,
            entry.state.message_count,
            commit.citations,
            commit.confidence,
        );
        entry.messages.push(message.clone());
        entry.state.active_card_ids = commit.active_card_ids;
        entry.state.updated_at = Utc::now();
        Ok(message)
    }

    async fn replace_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let entry = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        entry.state.context_summary = Some(summary.to_string());
        entry.state.updated_at = Utc::now();
        Ok(())
    }
}
