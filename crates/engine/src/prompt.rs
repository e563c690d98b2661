//! Prompt assembly for the generation call.
//!
//! Layout of the system message:
//!
//! | section | content |
//! |---------|---------|
//! | persona | configured preamble |
//! | knowledge cards | every loaded card, tier-labelled, catalog order |
//! | conversation summary | rolling summary, when present |
//!
//! History is replayed newest-first into the token budget and then restored
//! to chronological order. The current user message always comes last.
//! Assembly is deterministic for identical inputs.

use crate::token;
use cardwise_config::PromptConfig;
use cardwise_core::card::{LoadedCard, Tier};
use cardwise_core::message::{Message, Role};
use cardwise_core::provider::ChatMessage;
use serde::Serialize;

/// Inputs for one generation prompt.
pub struct PromptInput<'a> {
    pub loaded_cards: &'a [LoadedCard],
    pub summary: Option<&'a str>,
    /// Prior messages, oldest first, excluding the current user message.
    pub history: &'a [Message],
    pub user_message: &'a str,
}

/// The assembled prompt and what went into it.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub messages: Vec<ChatMessage>,
    pub stats: PromptStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptStats {
    pub cards_full: usize,
    pub cards_excerpt: usize,
    pub cards_title_only: usize,
    pub history_included: usize,
    pub history_dropped: usize,
    pub estimated_tokens: usize,
}

/// Builds generation prompts. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    history_token_budget: usize,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, history_token_budget: usize) -> Self {
        Self {
            persona: persona.into(),
            history_token_budget,
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(config.persona.clone(), config.history_token_budget)
    }

    pub fn build(&self, input: &PromptInput<'_>) -> AssembledPrompt {
        let mut stats = PromptStats::default();
        let system = self.system_message(input, &mut stats);

        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(ChatMessage::system(system));

        let history = self.history_window(input.history);
        stats.history_included = history.len();
        stats.history_dropped = input.history.len() - history.len();
        messages.extend(history.iter().map(|m| match m.role {
            Role::User => ChatMessage::user(m.content.clone()),
            Role::Assistant => ChatMessage::assistant(m.content.clone()),
        }));

        messages.push(ChatMessage::user(input.user_message));
        stats.estimated_tokens = token::estimate_prompt_tokens(&messages);

        AssembledPrompt { messages, stats }
    }

    fn system_message(&self, input: &PromptInput<'_>, stats: &mut PromptStats) -> String {
        let mut out = self.persona.trim().to_string();

        if !input.loaded_cards.is_empty() {
            out.push_str("\n\n## Knowledge cards\n");
            out.push_str(
                "Cards are shown in full, as an excerpt, or by title only, depending on \
                 their relevance to this message. Mention a card's title when you rely on it.\n",
            );
            for card in input.loaded_cards {
                let label = match card.tier {
                    Tier::Full => {
                        stats.cards_full += 1;
                        "full"
                    }
                    Tier::Excerpt => {
                        stats.cards_excerpt += 1;
                        "excerpt"
                    }
                    Tier::TitleOnly => {
                        stats.cards_title_only += 1;
                        "title only"
                    }
                };
                out.push_str(&format!(
                    "\n### {} [{}, {}, relevance {}]\n",
                    card.title, card.card_type, label, card.relevance
                ));
                if card.tier != Tier::TitleOnly && !card.content.is_empty() {
                    out.push_str(&card.content);
                    out.push('\n');
                }
            }
        }

        if let Some(summary) = input.summary.filter(|s| !s.trim().is_empty()) {
            out.push_str("\n\n## Conversation summary\n");
            out.push_str(summary.trim());
            out.push('\n');
        }

        out
    }

    /// The newest messages that fit the history budget, oldest first.
    fn history_window<'m>(&self, history: &'m [Message]) -> &'m [Message] {
        let mut used = 0;
        let mut start = history.len();
        for (i, message) in history.iter().enumerate().rev() {
            let cost = token::estimate_message_tokens(message);
            if used + cost > self.history_token_budget {
                break;
            }
            used += cost;
            start = i;
        }
        &history[start..]
    }
}
