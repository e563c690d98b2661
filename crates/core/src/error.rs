//! Error types for the Cardwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Cardwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),
}

impl ProviderError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Client errors (4xx) are final except 408 and 429. Missing credentials,
    /// unknown models, and unparseable output are final as well.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => {
                let code = *status_code;
                !(400..500).contains(&code) || code == 408 || code == 429
            }
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_)
            | Self::MalformedOutput(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid card record: {0}")]
    InvalidCard(String),
}

/// Turn-level failures. Only `GenerationFailed` and `Store` abort a turn;
/// the others are logged and replaced by a safe default.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Intent classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[source] ProviderError),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Malformed metadata on card {card_id}: field `{field}` {reason}")]
    MalformedCardMetadata {
        card_id: String,
        field: String,
        reason: String,
    },

    #[error("Store failure during turn: {0}")]
    Store(#[from] StoreError),
}
