//! Prompt construction from the agent data directory.
//!
//! ```text
//! <data_dir>/
//!   soul.md          identity; head of the system prompt
//!   HEARTBEAT.md     heartbeat jobs
//!   tasks/*.md       task files
//! ```
//!
//! A task file is appended to the system prompt unless it opens with a
//! `---` frontmatter block that does not say `autoload: true`; such files
//! are reference handbooks and are shown once, in the first tick prompt.

use std::path::Path;

use cadence_workflow::{HeartbeatJob, JobMode};
use tracing::debug;

pub const SOUL_FILE: &str = "soul.md";
pub const HEARTBEAT_FILE: &str = "HEARTBEAT.md";
pub const TASKS_DIR: &str = "tasks";

const DEFAULT_SOUL: &str = "You are an autonomous agent. You act on a schedule, observe the \
world state you are given, and keep notes in your task files.";

const DEFAULT_HEARTBEAT: &str = r#"# Heartbeat

Scheduled jobs. Each job runs at most once per matching minute.

```yaml
version: 1
jobs:
  - id: review-notes
    enabled: false
    schedule: "0 * * * *"
    mode: observe
    prompt: Review your task files and tidy anything out of date.
```
"#;

const DEFAULT_HANDBOOK: &str = "---\nautoload: false\n---\n\
# Getting Started\n\nRead the world state carefully before acting. Record what you learn in tasks/learnings.md.\n";

/// Guidance line for a heartbeat job's mode.
pub fn mode_guidance(mode: JobMode) -> &'static str {
    match mode {
        JobMode::Observe => {
            "Observe-only heartbeat: do not execute actions. You may read and update markdown/task files."
        }
        JobMode::Act => "Action-enabled heartbeat: you may execute actions if justified.",
    }
}

/// The prompt submitted for a due heartbeat job.
pub fn format_heartbeat_prompt(job: &HeartbeatJob) -> String {
    [
        format!("## Heartbeat Job: {}", job.id),
        format!("Schedule: {}", job.schedule),
        format!("Mode: {}", job.mode),
        mode_guidance(job.mode).to_string(),
        "Follow the job instructions below:".to_string(),
        job.prompt.clone(),
    ]
    .join("\n\n")
}

/// Default tick prompt: the world state as pretty JSON.
pub fn format_tick_prompt(world_state: &serde_json::Value) -> String {
    let state = serde_json::to_string_pretty(world_state).unwrap_or_else(|_| world_state.to_string());
    format!(
        "## World State\n\n```json\n{state}\n```\n\nReview the state above and decide your next actions."
    )
}

/// Prefix `tick_prompt` with reference handbooks for the first tick.
pub fn with_handbooks(handbooks: &str, tick_prompt: &str) -> String {
    format!(
        "{handbooks}\n\n---\n\n{tick_prompt}\n\nIMPORTANT: This is your first tick. Study the \
reference handbooks above before taking any actions. Write key insights to tasks/learnings.md so you retain them."
    )
}

/// Split a leading `---` frontmatter block from `raw`.
fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    let front = &rest[..end];
    let body = rest[end + 4..].strip_prefix('\n').unwrap_or(&rest[end + 4..]);
    Some((front, body))
}

fn autoloads(frontmatter: &str) -> bool {
    serde_yml::from_str::<serde_json::Value>(frontmatter)
        .ok()
        .and_then(|fm| fm.get("autoload").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

/// One task file, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskFile {
    Autoload { domain: String, body: String },
    Handbook { domain: String, body: String },
}

async fn read_task_files(data_dir: &Path) -> Vec<TaskFile> {
    let dir = data_dir.join(TASKS_DIR);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let Ok(raw) = tokio::fs::read_to_string(&path).await else {
            debug!(path = %path.display(), "Skipping unreadable task file");
            continue;
        };
        let domain = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = match split_frontmatter(&raw) {
            Some((front, body)) if !autoloads(front) => TaskFile::Handbook {
                domain,
                body: body.trim().to_string(),
            },
            Some((_, body)) => TaskFile::Autoload {
                domain,
                body: body.trim().to_string(),
            },
            None => TaskFile::Autoload {
                domain,
                body: raw.trim().to_string(),
            },
        };
        files.push(file);
    }
    files
}

/// Assemble the system prompt: `soul.md`, then every autoloaded task file.
pub async fn build_system_prompt(data_dir: &Path) -> String {
    let soul = tokio::fs::read_to_string(data_dir.join(SOUL_FILE))
        .await
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SOUL.to_string());

    let tasks: Vec<String> = read_task_files(data_dir)
        .await
        .into_iter()
        .filter_map(|file| match file {
            TaskFile::Autoload { domain, body } if !body.is_empty() => {
                Some(format!("<task domain=\"{domain}\">\n{body}\n</task>"))
            }
            _ => None,
        })
        .collect();

    if tasks.is_empty() {
        soul
    } else {
        format!("{soul}\n\n## Task Files\n\n{}", tasks.join("\n\n"))
    }
}

/// Reference handbooks section, or `None` when there are none.
pub async fn load_reference_handbooks(data_dir: &Path) -> Option<String> {
    let sections: Vec<String> = read_task_files(data_dir)
        .await
        .into_iter()
        .filter_map(|file| match file {
            TaskFile::Handbook { domain, body } if !body.is_empty() => Some(format!(
                "<reference domain=\"{domain}\">\n{body}\n</reference>"
            )),
            _ => None,
        })
        .collect();

    if sections.is_empty() {
        return None;
    }
    Some(format!(
        "## Reference Handbooks (study these before acting)\n\n{}",
        sections.join("\n\n")
    ))
}

/// Create the data directory with starter files. Existing files are kept.
pub fn seed_data_dir(data_dir: &Path) -> std::io::Result<()> {
    let tasks = data_dir.join(TASKS_DIR);
    std::fs::create_dir_all(&tasks)?;

    let seeds = [
        (data_dir.join(SOUL_FILE), format!("{DEFAULT_SOUL}\n")),
        (data_dir.join(HEARTBEAT_FILE), DEFAULT_HEARTBEAT.to_string()),
        (tasks.join("getting-started.md"), DEFAULT_HANDBOOK.to_string()),
    ];
    for (path, contents) in seeds {
        if !path.exists() {
            std::fs::write(&path, contents)?;
            debug!(path = %path.display(), "Seeded data file");
        }
    }
    Ok(())
}
