//! Heartbeat job file parsing.
//!
//! The file is either a Markdown document with a ```` ```yaml ```` fenced
//! block, or bare YAML. Parsing never fails: a corrupted file yields no
//! jobs, and malformed job entries are dropped individually.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Whether a heartbeat job may take actions or only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Observe,
    Act,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Observe => "observe",
            JobMode::Act => "act",
        }
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled heartbeat job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatJob {
    pub id: String,
    pub enabled: bool,

    /// 5-field cron expression
    pub schedule: String,

    pub prompt: String,
    pub mode: JobMode,

    /// Advisory only; never enforced by the loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<f64>,
}

/// Snapshot of the heartbeat file, re-read on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub version: i64,
    pub jobs: Vec<HeartbeatJob>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
        }
    }
}

/// Parse heartbeat file contents.
pub fn parse(text: &str) -> HeartbeatConfig {
    let source = extract_yaml_block(text).unwrap_or(text);

    let root: Value = match serde_yml::from_str(source) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Heartbeat file is not valid YAML, treating as empty");
            return HeartbeatConfig::default();
        }
    };
    let Value::Object(root) = root else {
        debug!("Heartbeat file root is not a mapping, treating as empty");
        return HeartbeatConfig::default();
    };

    let version = root.get("version").and_then(Value::as_i64).unwrap_or(1);
    let jobs = match root.get("jobs") {
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let job = parse_job(entry);
                if job.is_none() {
                    debug!(index, "Dropping malformed heartbeat job entry");
                }
                job
            })
            .collect(),
        _ => Vec::new(),
    };

    HeartbeatConfig { version, jobs }
}

/// Contents of the first ```` ```yaml ```` / ```` ```yml ```` fenced block.
fn extract_yaml_block(text: &str) -> Option<&str> {
    let mut offset = 0;
    let mut body_start = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        match body_start {
            None => {
                if let Some(tag) = trimmed.strip_prefix("```") {
                    let tag = tag.trim();
                    if tag.eq_ignore_ascii_case("yaml") || tag.eq_ignore_ascii_case("yml") {
                        body_start = Some(offset + line.len());
                    }
                }
            }
            Some(start) => {
                if trimmed.starts_with("```") {
                    return Some(&text[start..offset]);
                }
            }
        }
        offset += line.len();
    }

    // Unterminated fence: take everything after the opening line
    body_start.map(|start| &text[start..])
}

fn parse_job(entry: &Value) -> Option<HeartbeatJob> {
    let obj = entry.as_object()?;

    let id = non_empty(obj.get("id"))?;
    let schedule = non_empty(obj.get("schedule"))?;
    let prompt = obj.get("prompt")?.as_str()?;
    if prompt.trim().is_empty() {
        return None;
    }

    let enabled = obj.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let mode = match obj.get("mode").and_then(Value::as_str) {
        Some("act") => JobMode::Act,
        _ => JobMode::Observe,
    };
    let timeout_sec = obj
        .get("timeoutSec")
        .and_then(Value::as_f64)
        .filter(|t| t.is_finite() && *t > 0.0);

    Some(HeartbeatJob {
        id,
        enabled,
        schedule,
        prompt: prompt.to_string(),
        mode,
        timeout_sec,
    })
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?;
    (!s.is_empty()).then(|| s.to_string())
}
