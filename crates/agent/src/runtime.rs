//! Agent runtime: one orchestrator driven by a tick loop and a heartbeat
//! loop, plus live reconfiguration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use cadence_config::{AppConfig, ConfigKey, parse_config_value, resolve_config_path};
use cadence_workflow::{Clock, ErrorHandler, HeartbeatLoop, PathSource, TickLoop, WorkflowError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContextWindow;
use crate::orchestrator::Orchestrator;
use crate::prompt;
use crate::queue::{PromptQueue, QueueError};

struct RuntimeState {
    orchestrator: Orchestrator,
    ticker: Arc<TickLoop>,
    heartbeat: Arc<HeartbeatLoop>,
    config: RwLock<AppConfig>,
    started: AtomicBool,
    /// Serializes config change batches from every manager handle
    apply_queue: PromptQueue,
}

impl RuntimeState {
    fn config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_config(&self, config: AppConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }
}

/// Owns the orchestrator and both scheduling loops.
pub struct AgentRuntime {
    state: Arc<RuntimeState>,
}

impl AgentRuntime {
    /// Wire `orchestrator` to a tick loop and a heartbeat loop configured
    /// from `config`. Loop errors go to `on_error`, or are logged.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: AppConfig,
        orchestrator: Orchestrator,
        on_error: Option<ErrorHandler>,
    ) -> Result<Self, WorkflowError> {
        Self::with_clock(config, orchestrator, on_error, None)
    }

    /// Like [`AgentRuntime::new`] with the heartbeat clock replaced.
    pub fn with_clock(
        config: AppConfig,
        orchestrator: Orchestrator,
        on_error: Option<ErrorHandler>,
        clock: Option<Clock>,
    ) -> Result<Self, WorkflowError> {
        orchestrator.set_data_dir(config.data_dir.clone());
        orchestrator.set_context_window(
            ContextWindow::new(config.context.max_tokens)
                .with_chars_per_token(config.context.chars_per_token),
        );

        let mut ticker = TickLoop::new(config.ticker.tick_interval_ms, Arc::new(orchestrator.clone()))?;
        if let Some(handler) = &on_error {
            ticker = ticker.with_error_handler(handler.clone());
        }

        let paths = orchestrator.clone();
        let path: PathSource = Arc::new(move || paths.heartbeat_path());
        let mut heartbeat = HeartbeatLoop::new(
            path,
            Arc::new(orchestrator.clone()),
            config.heartbeat.poll_interval_ms,
        )?;
        if let Some(handler) = on_error {
            heartbeat = heartbeat.with_error_handler(handler);
        }
        if let Some(clock) = clock {
            heartbeat = heartbeat.with_clock(clock);
        }

        Ok(Self {
            state: Arc::new(RuntimeState {
                orchestrator,
                ticker: Arc::new(ticker),
                heartbeat: Arc::new(heartbeat),
                config: RwLock::new(config),
                started: AtomicBool::new(false),
                apply_queue: PromptQueue::new(),
            }),
        })
    }

    /// Start whichever loops the current config enables.
    pub fn start(&self) {
        self.state.started.store(true, Ordering::Release);
        let config = self.state.config();
        if config.ticker.enabled {
            self.state.ticker.start();
        } else {
            info!("Tick loop disabled; enable with loop.enabled");
        }
        if config.heartbeat.enabled {
            self.state.heartbeat.start();
        }
    }

    /// Stop both loops. In-flight turns are not interrupted.
    pub fn stop(&self) {
        self.state.started.store(false, Ordering::Release);
        self.state.heartbeat.stop();
        self.state.ticker.stop();
    }

    /// Stop both loops and wait for queued turns to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.state.orchestrator.drain().await;
        info!(ticks = self.tick_count(), "Agent runtime shut down");
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.state.orchestrator
    }

    pub fn ticker(&self) -> &Arc<TickLoop> {
        &self.state.ticker
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatLoop> {
        &self.state.heartbeat
    }

    pub fn tick_count(&self) -> u64 {
        self.state.ticker.tick_count()
    }

    pub fn config(&self) -> AppConfig {
        self.state.config()
    }

    /// A handle for live configuration changes. All handles share one
    /// apply queue.
    pub fn config_manager(&self) -> RuntimeConfigManager {
        RuntimeConfigManager {
            state: self.state.clone(),
        }
    }
}

/// One requested change: a dotted path and a raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfigChange {
    pub path: String,
    pub value: serde_json::Value,
}

impl RuntimeConfigChange {
    pub fn new(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfigUpdateResult {
    pub path: String,
    pub applied: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigApplyResult {
    /// Every change applied
    pub ok: bool,
    pub results: Vec<RuntimeConfigUpdateResult>,
    pub current_config: AppConfig,
}

/// Applies configuration changes to a live runtime.
///
/// Batches run one at a time in submission order.
#[derive(Clone)]
pub struct RuntimeConfigManager {
    state: Arc<RuntimeState>,
}

impl RuntimeConfigManager {
    pub fn get_config(&self) -> AppConfig {
        self.state.config()
    }

    pub async fn apply_changes(
        &self,
        changes: Vec<RuntimeConfigChange>,
        reason: Option<String>,
    ) -> Result<RuntimeConfigApplyResult, QueueError> {
        let state = self.state.clone();
        self.state
            .apply_queue
            .enqueue(move || async move { apply_batch(&state, changes, reason.as_deref()) })
            .await
    }
}

fn apply_batch(
    state: &RuntimeState,
    changes: Vec<RuntimeConfigChange>,
    reason: Option<&str>,
) -> RuntimeConfigApplyResult {
    let current = state.config();
    let mut candidate = current.clone();
    let mut results = Vec::with_capacity(changes.len());
    // (key, index into results) for changes waiting on a live apply
    let mut pending: Vec<(ConfigKey, usize)> = Vec::new();

    for change in changes {
        let Some(key) = resolve_config_path(&change.path) else {
            results.push(RuntimeConfigUpdateResult {
                message: format!("Unknown config path '{}'", change.path),
                path: change.path,
                applied: false,
            });
            continue;
        };

        let outcome = parse_config_value(key, &change.value).and_then(|value| {
            if candidate.get(key) == value {
                return Ok(false);
            }
            candidate.set(key, value)?;
            Ok(true)
        });
        let (applied, message) = match outcome {
            Ok(false) => (true, format!("{key} already set")),
            Ok(true) => {
                pending.push((key, results.len()));
                (false, "queued".to_string())
            }
            Err(e) => (false, e.to_string()),
        };
        results.push(RuntimeConfigUpdateResult {
            path: change.path,
            applied,
            message,
        });
    }

    let mut changed: Vec<ConfigKey> = Vec::new();
    for (key, _) in &pending {
        if !changed.contains(key) {
            changed.push(*key);
        }
    }

    for key in changed {
        let outcome = apply_key(state, &candidate, key);
        let (applied, message) = match outcome {
            Ok(message) => (true, message.to_string()),
            Err(message) => {
                // Keep the old value for a change that could not go live
                let _ = candidate.set(key, current.get(key));
                (false, message)
            }
        };
        for (_, index) in pending.iter().filter(|(k, _)| *k == key) {
            results[*index].applied = applied;
            results[*index].message = message.clone();
        }
    }

    state.set_config(candidate.clone());
    if let Some(reason) = reason {
        info!(reason, "Applied runtime config changes");
    }

    RuntimeConfigApplyResult {
        ok: results.iter().all(|r| r.applied),
        results,
        current_config: candidate,
    }
}

fn apply_key(state: &RuntimeState, candidate: &AppConfig, key: ConfigKey) -> Result<&'static str, String> {
    let live = state.started.load(Ordering::Acquire);
    match key {
        ConfigKey::TickIntervalMs => {
            state
                .ticker
                .set_interval_ms(candidate.ticker.tick_interval_ms)
                .map_err(|e| e.to_string())?;
            Ok("Updated live tick interval")
        }
        ConfigKey::LoopEnabled => {
            if !candidate.ticker.enabled {
                state.ticker.stop();
            } else if live {
                state.ticker.start();
            }
            Ok("Updated live loop state")
        }
        ConfigKey::HeartbeatPollMs => {
            state
                .heartbeat
                .set_poll_interval_ms(candidate.heartbeat.poll_interval_ms)
                .map_err(|e| e.to_string())?;
            Ok("Updated live heartbeat poll interval")
        }
        ConfigKey::DataDir => {
            prompt::seed_data_dir(&candidate.data_dir)
                .map_err(|e| format!("Failed to prepare {}: {e}", candidate.data_dir.display()))?;
            state.orchestrator.set_data_dir(candidate.data_dir.clone());
            Ok("Updated live data directory")
        }
        ConfigKey::MaxContextTokens => {
            state.orchestrator.set_context_window(
                ContextWindow::new(candidate.context.max_tokens)
                    .with_chars_per_token(candidate.context.chars_per_token),
            );
            Ok("Updated live context budget")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::test_support::{MockSession, StaticWorld};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        dir: tempfile::TempDir,
        session: Arc<MockSession>,
        runtime: AgentRuntime,
    }

    fn harness(tick_ms: u64, poll_ms: u64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        prompt::seed_data_dir(dir.path()).unwrap();
        let mut config = AppConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.ticker.tick_interval_ms = tick_ms;
        config.heartbeat.poll_interval_ms = poll_ms;

        let session = Arc::new(MockSession::default());
        let orchestrator = Orchestrator::new(
            session.clone(),
            Arc::new(StaticWorld(json!({"gold": 10}))),
            dir.path().to_path_buf(),
        );
        let runtime = AgentRuntime::new(config, orchestrator, None).unwrap();
        Harness { dir, session, runtime }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_reach_the_session() {
        let h = harness(1_000, 60_000);
        h.runtime.start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        h.runtime.shutdown().await;

        assert_eq!(h.runtime.tick_count(), 2);
        assert_eq!(h.session.prompts.lock().unwrap().len(), 2);
        assert!(!h.runtime.ticker().is_running());
        assert!(!h.runtime.heartbeat().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_loop_does_not_tick() {
        let h = harness(1_000, 60_000);
        let manager = h.runtime.config_manager();
        let result = manager
            .apply_changes(vec![RuntimeConfigChange::new("loop.enabled", "off")], None)
            .await
            .unwrap();
        assert!(result.ok);
        assert!(!result.current_config.ticker.enabled);

        h.runtime.start();
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(h.runtime.tick_count(), 0);
        assert!(h.runtime.heartbeat().is_running());
        h.runtime.stop();
    }

    #[tokio::test]
    async fn aliases_and_values_resolved_per_change() {
        let h = harness(60_000, 15_000);
        let manager = h.runtime.config_manager();

        let result = manager
            .apply_changes(
                vec![
                    RuntimeConfigChange::new("Loop.TickIntervalMs", "2500.8"),
                    RuntimeConfigChange::new("heartbeatPollMs", 15_000),
                    RuntimeConfigChange::new("world.rpcUrl", "http://localhost"),
                    RuntimeConfigChange::new("loopEnabled", "sometimes"),
                    RuntimeConfigChange::new("context.maxTokens", 50),
                ],
                Some("operator request".into()),
            )
            .await
            .unwrap();

        assert!(!result.ok);
        let r = &result.results;
        assert!(r[0].applied);
        assert_eq!(r[0].message, "Updated live tick interval");
        assert!(r[1].applied);
        assert_eq!(r[1].message, "heartbeatPollMs already set");
        assert!(!r[2].applied);
        assert_eq!(r[2].message, "Unknown config path 'world.rpcUrl'");
        assert!(!r[3].applied);
        assert!(r[3].message.contains("Invalid boolean"));
        assert!(r[4].applied);

        assert_eq!(h.runtime.ticker().interval_ms(), 2_500);
        assert_eq!(result.current_config.ticker.tick_interval_ms, 2_500);
        assert_eq!(h.runtime.orchestrator().context_window().max_tokens(), 50);
        assert_eq!(manager.get_config().context.max_tokens, 50);
    }

    #[tokio::test]
    async fn data_dir_change_is_seeded_and_live() {
        let h = harness(60_000, 15_000);
        let manager = h.runtime.config_manager();
        let next = h.dir.path().join("world-2");

        let result = manager
            .apply_changes(
                vec![RuntimeConfigChange::new("agent.dataDir", next.to_string_lossy().into_owned())],
                None,
            )
            .await
            .unwrap();

        assert!(result.ok, "{:?}", result.results);
        assert!(next.join("soul.md").exists());
        assert_eq!(h.runtime.orchestrator().heartbeat_path(), next.join("HEARTBEAT.md"));
    }

    #[tokio::test]
    async fn failed_live_apply_keeps_old_value() {
        let h = harness(60_000, 15_000);
        let manager = h.runtime.config_manager();
        // A file where a directory is needed
        let blocker = h.dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let result = manager
            .apply_changes(
                vec![RuntimeConfigChange::new("dataDir", blocker.to_string_lossy().into_owned())],
                None,
            )
            .await
            .unwrap();

        assert!(!result.ok);
        assert!(result.results[0].message.starts_with("Failed to prepare"));
        assert_eq!(result.current_config.data_dir, h.dir.path());
        assert_eq!(h.runtime.orchestrator().data_dir(), h.dir.path());
    }

    #[tokio::test]
    async fn batches_are_serialized() {
        let h = harness(60_000, 15_000);
        let manager = h.runtime.config_manager();

        let first = manager.apply_changes(vec![RuntimeConfigChange::new("tickIntervalMs", 1_000)], None);
        let second = manager.apply_changes(vec![RuntimeConfigChange::new("tickIntervalMs", 1_000)], None);
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap().results[0].message, "Updated live tick interval");
        assert_eq!(second.unwrap().results[0].message, "tickIntervalMs already set");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_manager_handles_share_one_apply_queue() {
        let h = harness(60_000, 15_000);
        let changes = [
            ("tickIntervalMs", json!(1_000)),
            ("heartbeatPollMs", json!(2_000)),
            ("maxContextTokens", json!(5_000)),
            ("loopEnabled", json!(false)),
        ];

        let tasks: Vec<_> = changes
            .into_iter()
            .map(|(path, value)| {
                let manager = h.runtime.config_manager();
                tokio::spawn(async move {
                    manager
                        .apply_changes(vec![RuntimeConfigChange::new(path, value)], None)
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().ok);
        }

        let config = h.runtime.config();
        assert_eq!(config.ticker.tick_interval_ms, 1_000);
        assert_eq!(config.heartbeat.poll_interval_ms, 2_000);
        assert_eq!(config.context.max_tokens, 5_000);
        assert!(!config.ticker.enabled);
    }
}
