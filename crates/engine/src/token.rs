//! Token estimation for prompt budgeting.
//!
//! Character heuristic: about 4 characters per token, rounded up. Close
//! enough for BPE tokenizers on English text to bound history replay.

use cardwise_core::message::Message;
use cardwise_core::provider::ChatMessage;

/// Per-message wire overhead (role name and delimiters).
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a stored message including overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(&message.content)
}

/// Estimate tokens for an assembled prompt.
pub fn estimate_prompt_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| MESSAGE_OVERHEAD + estimate_tokens(&m.content))
        .sum()
}
