//! Session trait: the abstraction over the reasoning engine's conversation.
//!
//! There is exactly one shared session per agent. Ticks, heartbeat jobs and
//! operator prompts all mutate it, so callers must serialize access (the
//! agent crate's `PromptQueue` does this).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::message::Message;

/// A tool definition installed on the session so the model knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The reasoning engine's conversation session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Submit a prompt and run the engine until the turn completes.
    ///
    /// The engine appends the prompt and every resulting message to its history.
    async fn prompt(&self, text: &str) -> Result<(), SessionError>;

    /// The currently installed system prompt.
    async fn system_prompt(&self) -> String;

    /// Replace the system prompt.
    async fn set_system_prompt(&self, prompt: String);

    /// The currently installed tools.
    async fn tools(&self) -> Vec<ToolDefinition>;

    /// Replace the tool list.
    async fn set_tools(&self, tools: Vec<ToolDefinition>) -> Result<(), SessionError>;

    /// Snapshot of the ordered message history.
    async fn messages(&self) -> Vec<Message>;

    /// Replace the message history (used after trimming the head).
    async fn replace_messages(&self, messages: Vec<Message>);
}
