//! `cadence run`: Drive the tick and heartbeat loops until Ctrl+C.
//!
//! Lines read from stdin become operator prompts. A few colon commands
//! inspect or reconfigure the running agent:
//!
//! ```text
//! :status              loop state and queue depth
//! :config              current configuration as JSON
//! :set <path> <value>  live config change, e.g. `:set loop.tickIntervalMs 30000`
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use cadence_agent::prompt::seed_data_dir;
use cadence_agent::{
    AgentRuntime, ContextWindow, Orchestrator, RuntimeConfigChange, RuntimeConfigManager,
};
use cadence_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::dry_run::{DryRunSession, FileWorld};

pub async fn run(data_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    seed_data_dir(&config.data_dir)?;

    println!("⏱  Cadence — Dry Run");
    println!("   Data dir:   {}", config.data_dir.display());
    println!(
        "   Tick loop:  {} (every {}ms)",
        on_off(config.ticker.enabled),
        config.ticker.tick_interval_ms
    );
    println!(
        "   Heartbeat:  {} (poll {}ms, {})",
        on_off(config.heartbeat.enabled),
        config.heartbeat.poll_interval_ms,
        config.heartbeat_path().display()
    );
    println!("   Context:    {} tokens", config.context.max_tokens);
    println!();
    println!("   Type a prompt, or :status / :config / :set <path> <value>");
    println!("   Press Ctrl+C to stop.\n");

    let session = Arc::new(DryRunSession::new());
    let world = Arc::new(FileWorld::new(&config.data_dir));

    let orchestrator = Orchestrator::builder(session, world.clone(), config.data_dir.clone())
        .context_window(
            ContextWindow::new(config.context.max_tokens)
                .with_chars_per_token(config.context.chars_per_token),
        )
        .heartbeat_file(config.heartbeat.file.clone())
        .build();

    let runtime = AgentRuntime::new(config, orchestrator, None)?;
    runtime.start();
    let manager = runtime.config_manager();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&runtime, &manager, &world, line.trim()).await,
                    // stdin closed: keep the loops running until Ctrl+C
                    Ok(None) => {
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                }
            }
        }
    }

    println!("\n👋 Shutting down...");
    runtime.shutdown().await;
    Ok(())
}

async fn handle_line(
    runtime: &AgentRuntime,
    manager: &RuntimeConfigManager,
    world: &FileWorld,
    line: &str,
) {
    if line.is_empty() {
        return;
    }

    match line.split_once(' ').unwrap_or((line, "")) {
        (":status", _) => {
            let queue = runtime.orchestrator().queue();
            println!(
                "ticker: {} ({} ticks) | heartbeat: {} | queued: {} | busy: {}",
                on_off(runtime.ticker().is_running()),
                runtime.tick_count(),
                on_off(runtime.heartbeat().is_running()),
                queue.queued(),
                queue.is_busy()
            );
        }
        (":config", _) => match serde_json::to_string_pretty(&runtime.config()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Failed to serialize config"),
        },
        (":set", rest) => {
            let Some((path, raw)) = rest.trim().split_once(' ') else {
                println!("usage: :set <path> <value>");
                return;
            };
            // Bare words are strings; anything that parses as JSON is taken as-is
            let value = serde_json::from_str(raw.trim())
                .unwrap_or_else(|_| serde_json::Value::String(raw.trim().to_string()));

            match manager
                .apply_changes(
                    vec![RuntimeConfigChange::new(path, value)],
                    Some("operator".into()),
                )
                .await
            {
                Ok(result) => {
                    for r in &result.results {
                        let mark = if r.applied { "✅" } else { "❌" };
                        println!("{mark} {}: {}", r.path, r.message);
                    }
                    world.set_data_dir(&result.current_config.data_dir);
                }
                Err(e) => warn!(error = %e, "Config change failed"),
            }
        }
        _ => {
            // Enqueued in input order; only the wait is spawned
            let turn = runtime.orchestrator().submit_prompt(line.to_string());
            tokio::spawn(async move {
                if let Err(e) = turn.await {
                    warn!(error = %e, "Operator prompt failed");
                } else {
                    info!("Operator prompt complete");
                }
            });
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
