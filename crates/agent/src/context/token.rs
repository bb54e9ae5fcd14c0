//! Message size estimation.
//!
//! Sizes are counted in characters; the context window converts its token
//! budget to characters with a fixed chars-per-token ratio.

use cadence_core::{Content, ContentBlock, Message, Role};

/// Default characters assumed per token.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Estimated size of one message in characters.
///
/// Only user, assistant, and tool-result messages count. Text blocks count
/// their text; tool calls count their serialized arguments plus the tool
/// name. Images count nothing.
pub fn estimate_message_chars(message: &Message) -> usize {
    match message.role {
        Role::User | Role::Assistant | Role::ToolResult => content_chars(&message.content),
        Role::Other => 0,
    }
}

/// Total estimated size of a slice of messages.
pub fn estimate_messages_chars(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_chars).sum()
}

fn content_chars(content: &Content) -> usize {
    match content {
        Content::Text(text) => text.chars().count(),
        Content::Blocks(blocks) => blocks.iter().map(block_chars).sum(),
    }
}

fn block_chars(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text { text } => text.chars().count(),
        ContentBlock::ToolCall {
            name, arguments, ..
        } => {
            let args = serde_json::to_string(arguments).unwrap_or_default();
            args.chars().count() + name.chars().count()
        }
        ContentBlock::Image { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_counts_characters_not_bytes() {
        assert_eq!(estimate_message_chars(&Message::user("héllo")), 5);
    }

    #[test]
    fn other_roles_are_free() {
        let note = Message::new(Role::Other, "a long custom note that the engine keeps");
        assert_eq!(estimate_message_chars(&note), 0);
    }

    #[test]
    fn tool_call_counts_arguments_and_name() {
        let msg = Message::assistant(vec![
            ContentBlock::Text { text: "ok".into() },
            ContentBlock::ToolCall {
                id: "c1".into(),
                name: "move".into(),
                arguments: json!({"x": 1}),
            },
            ContentBlock::Image {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            },
        ]);
        // "ok" + r#"{"x":1}"# + "move"
        assert_eq!(estimate_message_chars(&msg), 2 + 7 + 4);
    }

    #[test]
    fn sums_over_slice() {
        let msgs = vec![Message::user("abc"), Message::tool_result("de")];
        assert_eq!(estimate_messages_chars(&msgs), 5);
    }
}
