//! Glue between the schedulers and the shared session.
//!
//! Ticks, heartbeat jobs, and operator prompts all become turns on one
//! [`PromptQueue`], so at most one of them touches the session at a time.
//! Every turn trims the history, optionally refreshes the system prompt,
//! submits its prompt, and trims again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use cadence_core::{Session, WorldAdapter};
use cadence_workflow::{HeartbeatJob, JobRunner, RunContext, TickHandler};
use tracing::{debug, info};

use crate::context::ContextWindow;
use crate::prompt::{self, HEARTBEAT_FILE};
use crate::queue::PromptQueue;

/// Turns a world-state snapshot into a tick prompt.
pub type TickFormatter = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;

struct Shared {
    session: Arc<dyn Session>,
    world: Arc<dyn WorldAdapter>,
    queue: PromptQueue,
    window: RwLock<ContextWindow>,
    data_dir: RwLock<PathBuf>,
    heartbeat_file: String,
    tick_formatter: TickFormatter,
    first_tick: AtomicBool,
}

/// Cheap to clone; clones share the same queue and session.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

/// Configures an [`Orchestrator`] before its queue is spawned.
pub struct OrchestratorBuilder {
    session: Arc<dyn Session>,
    world: Arc<dyn WorldAdapter>,
    data_dir: PathBuf,
    window: ContextWindow,
    heartbeat_file: String,
    tick_formatter: TickFormatter,
}

impl OrchestratorBuilder {
    pub fn context_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn tick_formatter(mut self, formatter: TickFormatter) -> Self {
        self.tick_formatter = formatter;
        self
    }

    /// Heartbeat file name inside the data directory.
    pub fn heartbeat_file(mut self, file: impl Into<String>) -> Self {
        self.heartbeat_file = file.into();
        self
    }

    /// Must be called inside a tokio runtime (spawns the queue consumer).
    pub fn build(self) -> Orchestrator {
        Orchestrator {
            shared: Arc::new(Shared {
                session: self.session,
                world: self.world,
                queue: PromptQueue::new(),
                window: RwLock::new(self.window),
                data_dir: RwLock::new(self.data_dir),
                heartbeat_file: self.heartbeat_file,
                tick_formatter: self.tick_formatter,
                first_tick: AtomicBool::new(true),
            }),
        }
    }
}

impl Orchestrator {
    pub fn builder(
        session: Arc<dyn Session>,
        world: Arc<dyn WorldAdapter>,
        data_dir: PathBuf,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            session,
            world,
            data_dir,
            window: ContextWindow::new(100_000),
            heartbeat_file: HEARTBEAT_FILE.to_string(),
            tick_formatter: Arc::new(prompt::format_tick_prompt),
        }
    }

    /// Default settings. Must be called inside a tokio runtime.
    pub fn new(session: Arc<dyn Session>, world: Arc<dyn WorldAdapter>, data_dir: PathBuf) -> Self {
        Self::builder(session, world, data_dir).build()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.shared
            .data_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point the system prompt and heartbeat file at a new directory.
    pub fn set_data_dir(&self, dir: PathBuf) {
        info!(data_dir = %dir.display(), "Data directory changed");
        *self
            .shared
            .data_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner) = dir;
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.data_dir().join(&self.shared.heartbeat_file)
    }

    pub fn context_window(&self) -> ContextWindow {
        *self
            .shared
            .window
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_context_window(&self, window: ContextWindow) {
        *self
            .shared
            .window
            .write()
            .unwrap_or_else(PoisonError::into_inner) = window;
    }

    pub fn queue(&self) -> &PromptQueue {
        &self.shared.queue
    }

    /// One tick: snapshot the world and queue a turn that refreshes the
    /// system prompt before submitting the tick prompt.
    pub async fn on_tick(&self) -> cadence_core::Result<()> {
        let state = self.shared.world.world_state().await?;
        let mut tick_prompt = (self.shared.tick_formatter)(&state);

        if self.shared.first_tick.swap(false, Ordering::AcqRel) {
            if let Some(handbooks) = prompt::load_reference_handbooks(&self.data_dir()).await {
                tick_prompt = prompt::with_handbooks(&handbooks, &tick_prompt);
            }
        }

        let shared = self.shared.clone();
        self.shared
            .queue
            .enqueue(move || async move { shared.run_turn(&tick_prompt, true).await })
            .await?
    }

    /// Queue a turn for a due heartbeat job.
    pub async fn run_heartbeat_job(&self, job: &HeartbeatJob) -> cadence_core::Result<()> {
        let text = prompt::format_heartbeat_prompt(job);
        self.submit_prompt(text).await
    }

    /// Queue an arbitrary prompt, e.g. operator input.
    ///
    /// The prompt takes its place in the queue before this returns; the
    /// future only waits for the turn to finish.
    pub fn submit_prompt(
        &self,
        text: String,
    ) -> impl Future<Output = cadence_core::Result<()>> + Send + 'static {
        let shared = self.shared.clone();
        let turn = self
            .shared
            .queue
            .enqueue(move || async move { shared.run_turn(&text, false).await });
        async move { turn.await? }
    }

    /// Resolves once every turn queued before this call has finished.
    pub async fn drain(&self) {
        let _ = self.shared.queue.enqueue(|| async {}).await;
    }
}

impl Shared {
    async fn run_turn(&self, text: &str, refresh_system_prompt: bool) -> cadence_core::Result<()> {
        self.trim_history().await;
        if refresh_system_prompt {
            self.refresh_system_prompt().await;
        }
        let result = self.session.prompt(text).await;
        self.trim_history().await;
        result.map_err(Into::into)
    }

    async fn refresh_system_prompt(&self) {
        let dir = self
            .data_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let next = prompt::build_system_prompt(&dir).await;
        if self.session.system_prompt().await != next {
            info!(chars = next.len(), "Installing updated system prompt");
            self.session.set_system_prompt(next).await;
        }
    }

    async fn trim_history(&self) {
        let window = *self.window.read().unwrap_or_else(PoisonError::into_inner);
        let mut messages = self.session.messages().await;
        let dropped = window.trim_in_place(&mut messages);
        if dropped > 0 {
            debug!(dropped, retained = messages.len(), "Trimmed conversation history");
            self.session.replace_messages(messages).await;
        }
    }
}

#[async_trait]
impl TickHandler for Orchestrator {
    async fn on_tick(&self) -> cadence_core::Result<()> {
        Orchestrator::on_tick(self).await
    }
}

#[async_trait]
impl JobRunner for Orchestrator {
    async fn run(&self, job: HeartbeatJob, ctx: RunContext) -> cadence_core::Result<()> {
        debug!(job_id = %job.id, minute = %ctx.minute_key, "Queueing heartbeat job");
        self.run_heartbeat_job(&job).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use cadence_core::{Message, Session, SessionError, ToolDefinition, WorldAdapter, WorldError};
    use std::sync::Mutex;

    /// Session that appends the prompt and a fixed reply to its history.
    #[derive(Default)]
    pub struct MockSession {
        pub prompts: Mutex<Vec<String>>,
        pub system: Mutex<String>,
        pub system_sets: Mutex<usize>,
        pub history: Mutex<Vec<Message>>,
        pub tools: Mutex<Vec<ToolDefinition>>,
        pub fail_on: Option<String>,
    }

    #[async_trait]
    impl Session for MockSession {
        async fn prompt(&self, text: &str) -> Result<(), SessionError> {
            self.prompts.lock().unwrap().push(text.to_string());
            let mut history = self.history.lock().unwrap();
            history.push(Message::user(text));
            if self.fail_on.as_deref().is_some_and(|needle| text.contains(needle)) {
                return Err(SessionError::PromptFailed("model refused".into()));
            }
            history.push(Message::assistant("done"));
            Ok(())
        }

        async fn system_prompt(&self) -> String {
            self.system.lock().unwrap().clone()
        }

        async fn set_system_prompt(&self, prompt: String) {
            *self.system_sets.lock().unwrap() += 1;
            *self.system.lock().unwrap() = prompt;
        }

        async fn tools(&self) -> Vec<ToolDefinition> {
            self.tools.lock().unwrap().clone()
        }

        async fn set_tools(&self, tools: Vec<ToolDefinition>) -> Result<(), SessionError> {
            *self.tools.lock().unwrap() = tools;
            Ok(())
        }

        async fn messages(&self) -> Vec<Message> {
            self.history.lock().unwrap().clone()
        }

        async fn replace_messages(&self, messages: Vec<Message>) {
            *self.history.lock().unwrap() = messages;
        }
    }

    pub struct StaticWorld(pub serde_json::Value);

    #[async_trait]
    impl WorldAdapter for StaticWorld {
        async fn world_state(&self) -> Result<serde_json::Value, WorldError> {
            Ok(self.0.clone())
        }
    }

    pub struct OfflineWorld;

    #[async_trait]
    impl WorldAdapter for OfflineWorld {
        async fn world_state(&self) -> Result<serde_json::Value, WorldError> {
            Err(WorldError::Unavailable("indexer offline".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use cadence_workflow::JobMode;
    use serde_json::json;

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tasks")).unwrap();
        std::fs::write(dir.path().join("soul.md"), "You are Ada.").unwrap();
        dir
    }

    fn orchestrator(session: Arc<MockSession>, dir: &tempfile::TempDir) -> Orchestrator {
        Orchestrator::new(
            session,
            Arc::new(StaticWorld(json!({"tick": 1}))),
            dir.path().to_path_buf(),
        )
    }

    #[tokio::test]
    async fn tick_installs_system_prompt_once() {
        let dir = data_dir();
        let session = Arc::new(MockSession::default());
        let orch = orchestrator(session.clone(), &dir);

        orch.on_tick().await.unwrap();
        orch.on_tick().await.unwrap();

        assert_eq!(*session.system_sets.lock().unwrap(), 1);
        assert_eq!(*session.system.lock().unwrap(), "You are Ada.");
        assert_eq!(session.prompts.lock().unwrap().len(), 2);

        std::fs::write(dir.path().join("soul.md"), "You are Grace.").unwrap();
        orch.on_tick().await.unwrap();
        assert_eq!(*session.system_sets.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn handbooks_only_in_first_tick() {
        let dir = data_dir();
        std::fs::write(dir.path().join("tasks/economy.md"), "---\ntitle: economy\n---\nBuild farms.")
            .unwrap();
        let session = Arc::new(MockSession::default());
        let orch = orchestrator(session.clone(), &dir);

        orch.on_tick().await.unwrap();
        orch.on_tick().await.unwrap();

        let prompts = session.prompts.lock().unwrap();
        assert!(prompts[0].contains("<reference domain=\"economy\">"));
        assert!(prompts[0].contains("first tick"));
        assert!(!prompts[1].contains("Build farms."));
        assert!(prompts[1].contains("\"tick\": 1"));
    }

    #[tokio::test]
    async fn heartbeat_job_goes_through_queue() {
        let dir = data_dir();
        let session = Arc::new(MockSession::default());
        let orch = orchestrator(session.clone(), &dir);

        let job = HeartbeatJob {
            id: "scout".into(),
            enabled: true,
            schedule: "* * * * *".into(),
            prompt: "Look around.".into(),
            mode: JobMode::Act,
            timeout_sec: Some(30.0),
        };
        orch.run_heartbeat_job(&job).await.unwrap();

        let prompts = session.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("## Heartbeat Job: scout"));
        assert!(prompts[0].ends_with("Look around."));
        // Heartbeat turns leave the system prompt alone
        assert_eq!(*session.system_sets.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_prompt_reaches_caller_only() {
        let dir = data_dir();
        let session = Arc::new(MockSession {
            fail_on: Some("explode".into()),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), &dir);

        let bad = orch.submit_prompt("please explode".into());
        let good = orch.submit_prompt("carry on".into());
        let (bad, good) = tokio::join!(bad, good);

        assert!(matches!(bad, Err(cadence_core::Error::Session(_))));
        assert!(good.is_ok());
        let prompts = session.prompts.lock().unwrap();
        assert_eq!(*prompts, vec!["please explode", "carry on"]);
    }

    #[tokio::test]
    async fn prompts_run_in_submission_order_not_await_order() {
        let dir = data_dir();
        let session = Arc::new(MockSession::default());
        let orch = orchestrator(session.clone(), &dir);

        let first = orch.submit_prompt("hold the bridge".into());
        let second = tokio::spawn(orch.submit_prompt("scout the hills".into()));
        second.await.unwrap().unwrap();
        first.await.unwrap();

        let prompts = session.prompts.lock().unwrap();
        assert_eq!(*prompts, vec!["hold the bridge", "scout the hills"]);
    }

    #[tokio::test]
    async fn world_failure_surfaces_from_tick() {
        let dir = data_dir();
        let session = Arc::new(MockSession::default());
        let orch = Orchestrator::new(session.clone(), Arc::new(OfflineWorld), dir.path().to_path_buf());
        let err = orch.on_tick().await.unwrap_err();
        assert!(matches!(err, cadence_core::Error::World(_)));
        assert!(session.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_trimmed_around_each_turn() {
        let dir = data_dir();
        let session = Arc::new(MockSession::default());
        let orch = Orchestrator::builder(
            session.clone(),
            Arc::new(StaticWorld(json!({}))),
            dir.path().to_path_buf(),
        )
        .context_window(ContextWindow::new(10))
        .build();

        for i in 0..10 {
            orch.submit_prompt(format!("operator message number {i}")).await.unwrap();
        }

        let history = session.history.lock().unwrap();
        assert!(history.len() < 20);
        assert_ne!(history[0].role, cadence_core::Role::Assistant);
        let retained: usize = history.iter().map(crate::context::estimate_message_chars).sum();
        assert!(retained <= 40);
    }

    #[tokio::test]
    async fn data_dir_switch_changes_sources() {
        let dir = data_dir();
        let other = data_dir();
        std::fs::write(other.path().join("soul.md"), "You are Lin.").unwrap();
        let session = Arc::new(MockSession::default());
        let orch = Orchestrator::builder(
            session.clone(),
            Arc::new(StaticWorld(json!({}))),
            dir.path().to_path_buf(),
        )
        .heartbeat_file("JOBS.md")
        .build();

        orch.set_data_dir(other.path().to_path_buf());
        assert_eq!(orch.heartbeat_path(), other.path().join("JOBS.md"));
        orch.on_tick().await.unwrap();
        assert_eq!(*session.system.lock().unwrap(), "You are Lin.");
    }
}
