//! # Cardwise Core
//!
//! Domain types, collaborator traits, and error definitions for the Cardwise
//! knowledge-card engine. This crate has **no framework dependencies**: it
//! defines the model that the store, provider, and engine crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (card catalog, message history, text
//! generation, intent classification, summarization) is a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted stand-ins
//! - Clean dependency graph (all crates depend inward on core)

pub mod card;
pub mod collaborator;
pub mod error;
pub mod intent;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use card::{Card, CardMetadata, CardRecord, CardType, Citation, LoadedCard, Tier};
pub use collaborator::{IntentClassifier, IntentProposal, Summarizer};
pub use error::{EngineError, Error, ProviderError, Result, StoreError};
pub use intent::{Intent, IntentCategory, IntentSource};
pub use message::{ConversationId, ConversationState, Message, NewConversation, Role, TurnCommit};
pub use provider::{ChatMessage, ChatRole, Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{CardCatalog, ConversationStore};
