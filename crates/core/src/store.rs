//! Store traits: the card catalog and conversation history collaborators.
//!
//! The engine never touches storage directly. It reads the catalog for a
//! conversation's business, reads recent messages (ordered by sequence
//! number, citations attached), and writes back exactly once per turn
//! through [`ConversationStore::commit_turn`].

use crate::card::Card;
use crate::error::StoreError;
use crate::message::{ConversationId, ConversationState, Message, NewConversation, TurnCommit};
use async_trait::async_trait;

/// Read access to a business's knowledge cards.
///
/// Implementations: SQLite, in-memory.
#[async_trait]
pub trait CardCatalog: Send + Sync {
    /// All cards for a business, ordered by `order_index` then id.
    async fn cards(&self, business_id: &str) -> std::result::Result<Vec<Card>, StoreError>;
}

/// Persistence for conversation state and message history.
///
/// Implementations: SQLite, in-memory.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a conversation and return its initial state.
    async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> std::result::Result<ConversationState, StoreError>;

    /// Load the current working state.
    async fn state(&self, id: &ConversationId) -> std::result::Result<ConversationState, StoreError>;

    /// Append a user message, assigning the next sequence number and
    /// incrementing the message count.
    async fn append_user_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> std::result::Result<Message, StoreError>;

    /// The last `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Atomically append the assistant message, replace the active card set,
    /// and increment the message count.
    async fn commit_turn(
        &self,
        id: &ConversationId,
        commit: TurnCommit,
    ) -> std::result::Result<Message, StoreError>;

    /// Replace the rolling context summary.
    async fn replace_summary(
        &self,
        id: &ConversationId,
        summary: &str,
    ) -> std::result::Result<(), StoreError>;
}
