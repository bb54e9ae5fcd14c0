//! Conversation message types.
//!
//! A conversation history is an ordered `Vec<Message>` owned by the reasoning
//! engine's session. The engine only ever appends; the context window only
//! drops from the head.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Prompts submitted by the scheduler or an operator
    User,
    /// Model output
    Assistant,
    /// Output of a tool the assistant invoked
    ToolResult,
    /// Anything else the engine keeps in history (custom/system notes)
    #[serde(other)]
    Other,
}

/// A single content block inside a structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
}

/// Message content: either plain text or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<ContentBlock>> for Content {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Content::Blocks(blocks)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who produced this message
    pub role: Role,

    /// Text or structured blocks
    pub content: Content,

    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role and content.
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool_result(content: impl Into<Content>) -> Self {
        Self::new(Role::ToolResult, content)
    }

    /// Concatenated text of all text content, ignoring tool calls and images.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Scout the northern border");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, Content::Text("Scout the northern border".into()));
    }

    #[test]
    fn role_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&Role::ToolResult).unwrap();
        assert_eq!(json, "\"toolResult\"");

        let role: Role = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(role, Role::Other);
    }

    #[test]
    fn block_content_deserializes() {
        let json = serde_json::json!({
            "id": "m1",
            "role": "assistant",
            "timestamp": "2026-01-05T10:00:00Z",
            "content": [
                { "type": "text", "text": "Moving troops" },
                { "type": "toolCall", "id": "c1", "name": "move_army", "arguments": { "to": [3, 4] } }
            ]
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        let Content::Blocks(blocks) = &msg.content else {
            panic!("expected block content");
        };
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[1], ContentBlock::ToolCall { name, .. } if name == "move_army"));
    }

    #[test]
    fn text_joins_only_text_blocks() {
        let msg = Message::assistant(vec![
            ContentBlock::Text { text: "first".into() },
            ContentBlock::ToolCall {
                id: "c1".into(),
                name: "noop".into(),
                arguments: serde_json::Value::Null,
            },
            ContentBlock::Text { text: "second".into() },
        ]);
        assert_eq!(msg.text(), "first\nsecond");
    }
}
