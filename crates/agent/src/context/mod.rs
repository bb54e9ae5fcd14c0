//! Context budget for the shared conversation.
//!
//! The reasoning engine appends to one ever-growing history. Before and
//! after every turn the orchestrator trims its head so the retained window
//! fits the configured token budget.

pub mod token;
pub mod window;

pub use token::{DEFAULT_CHARS_PER_TOKEN, estimate_message_chars, estimate_messages_chars};
pub use window::{ContextWindow, trim};
