//! Conversation history trimming.
//!
//! Keeps the newest messages that fit a token budget and never lets the
//! retained window open on an assistant turn. The result is always a suffix
//! of the input, so the engine's append-only ordering is preserved.

use cadence_core::{Message, Role};

use super::token::{DEFAULT_CHARS_PER_TOKEN, estimate_message_chars};

/// A token budget for the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    max_tokens: usize,
    chars_per_token: usize,
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    pub fn with_chars_per_token(mut self, chars_per_token: usize) -> Self {
        self.chars_per_token = chars_per_token;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Budget in characters.
    pub fn budget_chars(&self) -> usize {
        self.max_tokens.saturating_mul(self.chars_per_token)
    }

    /// The retained suffix of `messages`.
    ///
    /// Returns `messages` itself when everything fits. Otherwise drops the
    /// message that crossed the budget (unless it is the newest) and all
    /// older ones, then any leading assistant messages.
    pub fn trim<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        match self.cutoff(messages) {
            Some(start) => &messages[start..],
            None => messages,
        }
    }

    /// Trim `messages` in place. Returns how many were dropped from the head.
    pub fn trim_in_place(&self, messages: &mut Vec<Message>) -> usize {
        let Some(start) = self.cutoff(messages) else {
            return 0;
        };
        messages.drain(..start);
        start
    }

    fn cutoff(&self, messages: &[Message]) -> Option<usize> {
        let budget = self.budget_chars();
        let newest = messages.len().checked_sub(1)?;

        let mut total = 0usize;
        let mut start = None;
        for (i, message) in messages.iter().enumerate().rev() {
            total = total.saturating_add(estimate_message_chars(message));
            if total > budget {
                start = Some(if i == newest { i } else { i + 1 });
                break;
            }
        }

        let mut start = start?;
        while messages
            .get(start)
            .is_some_and(|m| m.role == Role::Assistant)
        {
            start += 1;
        }
        Some(start)
    }
}

/// Trim `messages` to `max_tokens` at `chars_per_token` characters per token.
pub fn trim(messages: &[Message], max_tokens: usize, chars_per_token: usize) -> &[Message] {
    ContextWindow::new(max_tokens)
        .with_chars_per_token(chars_per_token)
        .trim(messages)
}
