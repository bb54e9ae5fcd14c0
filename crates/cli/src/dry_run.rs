//! Offline collaborators for `cadence run`.
//!
//! [`DryRunSession`] stands in for a reasoning engine: it logs every prompt
//! and answers with a fixed acknowledgement. [`FileWorld`] reads world state
//! from `world.json` in the data directory.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use cadence_core::{Message, Session, SessionError, ToolDefinition, WorldAdapter, WorldError};
use tracing::{debug, info};

pub const WORLD_FILE: &str = "world.json";

#[derive(Default)]
struct SessionState {
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    messages: Vec<Message>,
}

/// Session that records prompts without calling a model.
#[derive(Default)]
pub struct DryRunSession {
    state: tokio::sync::RwLock<SessionState>,
}

impl DryRunSession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Session for DryRunSession {
    async fn prompt(&self, text: &str) -> Result<(), SessionError> {
        let first_line = text.lines().next().unwrap_or_default();
        info!(chars = text.chars().count(), "Prompt: {first_line}");
        debug!("{text}");

        let mut state = self.state.write().await;
        state.messages.push(Message::user(text));
        state
            .messages
            .push(Message::assistant("(dry run) acknowledged"));
        Ok(())
    }

    async fn system_prompt(&self) -> String {
        self.state.read().await.system_prompt.clone()
    }

    async fn set_system_prompt(&self, prompt: String) {
        debug!(chars = prompt.chars().count(), "System prompt refreshed");
        self.state.write().await.system_prompt = prompt;
    }

    async fn tools(&self) -> Vec<ToolDefinition> {
        self.state.read().await.tools.clone()
    }

    async fn set_tools(&self, tools: Vec<ToolDefinition>) -> Result<(), SessionError> {
        self.state.write().await.tools = tools;
        Ok(())
    }

    async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    async fn replace_messages(&self, messages: Vec<Message>) {
        self.state.write().await.messages = messages;
    }
}

/// World adapter backed by `<data_dir>/world.json`.
///
/// A missing file reads as an empty object.
pub struct FileWorld {
    dir: RwLock<PathBuf>,
}

impl FileWorld {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: RwLock::new(data_dir.into()),
        }
    }

    pub fn set_data_dir(&self, dir: &Path) {
        *self.dir.write().unwrap_or_else(PoisonError::into_inner) = dir.to_path_buf();
    }

    pub fn path(&self) -> PathBuf {
        self.dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .join(WORLD_FILE)
    }
}

#[async_trait]
impl WorldAdapter for FileWorld {
    async fn world_state(&self) -> Result<serde_json::Value, WorldError> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| WorldError::InvalidState(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(serde_json::Value::Object(Default::default()))
            }
            Err(e) => Err(WorldError::Unavailable(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_session_appends_turn() {
        let session = DryRunSession::new();
        session.prompt("## World State\n{}").await.unwrap();

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "## World State\n{}");
        assert!(messages[1].text().contains("dry run"));
    }

    #[tokio::test]
    async fn missing_world_file_is_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let world = FileWorld::new(dir.path());
        assert_eq!(world.world_state().await.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn world_file_is_parsed_and_follows_data_dir() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join(WORLD_FILE), r#"{"turn": 12}"#).unwrap();

        let world = FileWorld::new(first.path());
        assert_eq!(world.world_state().await.unwrap(), serde_json::json!({}));

        world.set_data_dir(second.path());
        assert_eq!(
            world.world_state().await.unwrap(),
            serde_json::json!({ "turn": 12 })
        );
    }

    #[tokio::test]
    async fn malformed_world_file_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WORLD_FILE), "{ not json").unwrap();

        let err = FileWorld::new(dir.path()).world_state().await.unwrap_err();
        assert!(matches!(err, WorldError::InvalidState(_)));
    }
}
