//! Message and conversation domain types.
//!
//! Messages are append-only and carry a per-conversation sequence number.
//! The conversation's working state (active cards, rolling summary, message
//! count) is the only thing the engine mutates, once per completed turn.

use crate::card::Citation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A persisted message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Strictly increasing within a conversation, assigned at append time
    pub sequence_number: u64,

    /// Cards the answer drew on (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,

    /// Fused answer confidence (assistant messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message with the given sequence number.
    pub fn user(content: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            sequence_number,
            citations: Vec::new(),
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message with citations and confidence attached.
    pub fn assistant(
        content: impl Into<String>,
        sequence_number: u64,
        citations: Vec<Citation>,
        confidence: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            sequence_number,
            citations,
            confidence: Some(confidence),
            timestamp: Utc::now(),
        }
    }

    /// Ids of the cards cited by this message, in citation order.
    pub fn cited_card_ids(&self) -> Vec<String> {
        self.citations.iter().map(|c| c.card_id.clone()).collect()
    }
}

/// Parameters for opening a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    /// Caller-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<ConversationId>,

    /// The business whose card catalog backs this conversation
    pub business_id: String,

    /// Whether the business has an associated knowledge base
    #[serde(default)]
    pub has_knowledge_base: bool,
}

/// The mutable working state of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub id: ConversationId,

    pub business_id: String,

    pub has_knowledge_base: bool,

    /// Ordered, duplicate-free ids of the currently active cards
    pub active_card_ids: Vec<String>,

    /// Single replaceable rolling summary slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,

    /// Number of messages appended so far (monotonic)
    pub message_count: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a fresh state for a new conversation.
    pub fn new(new: NewConversation) -> Self {
        let now = Utc::now();
        Self {
            id: new.id.unwrap_or_default(),
            business_id: new.business_id,
            has_knowledge_base: new.has_knowledge_base,
            active_card_ids: Vec::new(),
            context_summary: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything written atomically when a turn completes.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    /// The generated answer text
    pub content: String,

    /// Citations extracted from the answer
    pub citations: Vec<Citation>,

    /// Fused answer confidence
    pub confidence: u8,

    /// The new working set, replacing the previous one
    pub active_card_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardType;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello", 1);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.sequence_number, 1);
        assert!(msg.citations.is_empty());
        assert!(msg.confidence.is_none());
    }

    #[test]
    fn assistant_message_exposes_cited_ids() {
        let citation = Citation {
            card_id: "c1".into(),
            card_type: CardType::Faq,
            excerpts: vec!["FAQ".into()],
            confidence: 30,
        };
        let msg = Message::assistant("Answer", 2, vec![citation], 61);
        assert_eq!(msg.cited_card_ids(), vec!["c1".to_string()]);
        assert_eq!(msg.confidence, Some(61));
    }

    #[test]
    fn role_parse_round_trip() {
        assert_eq!(Role::parse(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::parse(Role::Assistant.as_str()), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn new_state_starts_empty() {
        let state = ConversationState::new(NewConversation {
            id: Some(ConversationId::from("conv_1")),
            business_id: "biz".into(),
            has_knowledge_base: true,
        });
        assert_eq!(state.id.as_str(), "conv_1");
        assert!(state.active_card_ids.is_empty());
        assert!(state.context_summary.is_none());
        assert_eq!(state.message_count, 0);
    }

    #[test]
    fn message_serialization_uses_camel_case() {
        let msg = Message::user("Test message", 7);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"sequenceNumber\":7"));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "Test message");
    }
}
