//! Configuration loading, validation, and runtime value parsing for Cadence.
//!
//! Loads configuration from `~/.cadence/config.toml` with environment
//! variable overrides. Validates all settings at startup. Also owns the
//! dotted-path aliases and value parsers used for live configuration changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cadence/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent data directory (soul.md, HEARTBEAT.md, tasks/)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Tick loop configuration
    #[serde(default, rename = "loop")]
    pub ticker: LoopConfig,

    /// Heartbeat job configuration
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Conversation context budget
    #[serde(default)]
    pub context: ContextConfig,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    60_000
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the heartbeat file is re-read and matched
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Heartbeat file name, relative to the data directory
    #[serde(default = "default_heartbeat_file")]
    pub file: String,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}
fn default_heartbeat_file() -> String {
    "HEARTBEAT.md".into()
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            file: default_heartbeat_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the retained conversation history
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Characters assumed per token when estimating
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

fn default_max_tokens() -> usize {
    100_000
}
fn default_chars_per_token() -> usize {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cadence/config.toml).
    ///
    /// Environment overrides:
    /// - `CADENCE_DATA_DIR`
    /// - `CADENCE_TICK_INTERVAL_MS`
    /// - `CADENCE_LOOP_ENABLED`
    /// - `CADENCE_HEARTBEAT_POLL_MS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CADENCE_DATA_DIR") {
            self.data_dir = PathBuf::from(parse_string(&dir.into(), "CADENCE_DATA_DIR")?);
        }
        if let Some(ms) = lookup("CADENCE_TICK_INTERVAL_MS") {
            self.ticker.tick_interval_ms = parse_positive_int(&ms.into(), "CADENCE_TICK_INTERVAL_MS")?;
        }
        if let Some(enabled) = lookup("CADENCE_LOOP_ENABLED") {
            self.ticker.enabled = parse_bool(&enabled.into(), "CADENCE_LOOP_ENABLED")?;
        }
        if let Some(ms) = lookup("CADENCE_HEARTBEAT_POLL_MS") {
            self.heartbeat.poll_interval_ms =
                parse_positive_int(&ms.into(), "CADENCE_HEARTBEAT_POLL_MS")?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cadence")
    }

    /// Full path of the heartbeat job file.
    pub fn heartbeat_path(&self) -> PathBuf {
        self.data_dir.join(&self.heartbeat.file)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "loop.tick_interval_ms must be > 0".into(),
            ));
        }
        if self.heartbeat.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.heartbeat.file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "heartbeat.file must not be empty".into(),
            ));
        }
        if self.context.max_tokens == 0 || self.context.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_tokens and context.chars_per_token must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Current value of a live-configurable key.
    pub fn get(&self, key: ConfigKey) -> ConfigValue {
        match key {
            ConfigKey::TickIntervalMs => ConfigValue::Int(self.ticker.tick_interval_ms),
            ConfigKey::LoopEnabled => ConfigValue::Bool(self.ticker.enabled),
            ConfigKey::HeartbeatPollMs => ConfigValue::Int(self.heartbeat.poll_interval_ms),
            ConfigKey::DataDir => ConfigValue::Path(self.data_dir.clone()),
            ConfigKey::MaxContextTokens => ConfigValue::Int(self.context.max_tokens as u64),
        }
    }

    /// Set a live-configurable key. The value must have the key's type.
    pub fn set(&mut self, key: ConfigKey, value: ConfigValue) -> Result<(), ConfigError> {
        match (key, value) {
            (ConfigKey::TickIntervalMs, ConfigValue::Int(ms)) => self.ticker.tick_interval_ms = ms,
            (ConfigKey::LoopEnabled, ConfigValue::Bool(enabled)) => self.ticker.enabled = enabled,
            (ConfigKey::HeartbeatPollMs, ConfigValue::Int(ms)) => {
                self.heartbeat.poll_interval_ms = ms
            }
            (ConfigKey::DataDir, ConfigValue::Path(dir)) => self.data_dir = dir,
            (ConfigKey::MaxContextTokens, ConfigValue::Int(tokens)) => {
                self.context.max_tokens = tokens as usize
            }
            (key, value) => {
                return Err(ConfigError::InvalidValue {
                    key: key.as_str().into(),
                    reason: format!("type mismatch: {value:?}"),
                });
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ticker: LoopConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

// ── Live configuration keys ─────────────────────────────────────────────────

/// A configuration key that can be changed while the agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TickIntervalMs,
    LoopEnabled,
    HeartbeatPollMs,
    DataDir,
    MaxContextTokens,
}

impl ConfigKey {
    /// Canonical name used in result messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::TickIntervalMs => "tickIntervalMs",
            ConfigKey::LoopEnabled => "loopEnabled",
            ConfigKey::HeartbeatPollMs => "heartbeatPollMs",
            ConfigKey::DataDir => "dataDir",
            ConfigKey::MaxContextTokens => "maxContextTokens",
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed live-configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(u64),
    Bool(bool),
    Path(PathBuf),
}

const CONFIG_PATH_ALIASES: &[(&str, ConfigKey)] = &[
    ("tickintervalms", ConfigKey::TickIntervalMs),
    ("loop.tickintervalms", ConfigKey::TickIntervalMs),
    ("loopenabled", ConfigKey::LoopEnabled),
    ("loop.enabled", ConfigKey::LoopEnabled),
    ("heartbeatpollms", ConfigKey::HeartbeatPollMs),
    ("heartbeat.pollintervalms", ConfigKey::HeartbeatPollMs),
    ("datadir", ConfigKey::DataDir),
    ("agent.datadir", ConfigKey::DataDir),
    ("maxcontexttokens", ConfigKey::MaxContextTokens),
    ("context.maxtokens", ConfigKey::MaxContextTokens),
];

/// Resolve a user-supplied dotted path (case-insensitive) to a config key.
pub fn resolve_config_path(path: &str) -> Option<ConfigKey> {
    let normalized = path.trim().to_lowercase();
    CONFIG_PATH_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, key)| *key)
}

/// Parse a raw JSON value into the type expected by `key`.
pub fn parse_config_value(
    key: ConfigKey,
    value: &serde_json::Value,
) -> Result<ConfigValue, ConfigError> {
    let name = key.as_str();
    match key {
        ConfigKey::TickIntervalMs | ConfigKey::HeartbeatPollMs | ConfigKey::MaxContextTokens => {
            parse_positive_int(value, name).map(ConfigValue::Int)
        }
        ConfigKey::LoopEnabled => parse_bool(value, name).map(ConfigValue::Bool),
        ConfigKey::DataDir => parse_string(value, name).map(|s| ConfigValue::Path(s.into())),
    }
}

/// Accepts a JSON bool or `1/true/yes/on`, `0/false/no/off` strings.
pub fn parse_bool(value: &serde_json::Value, key: &str) -> Result<bool, ConfigError> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, "Invalid boolean")),
        },
        _ => Err(invalid(key, "Invalid boolean")),
    }
}

/// Accepts a number or numeric string; must be finite and > 0. Floored.
pub fn parse_positive_int(value: &serde_json::Value, key: &str) -> Result<u64, ConfigError> {
    let numeric = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match numeric {
        Some(n) if n.is_finite() && n > 0.0 && n.floor() >= 1.0 => Ok(n.floor() as u64),
        _ => Err(invalid(key, "Invalid positive number")),
    }
}

/// Accepts a non-blank string; returns it trimmed.
pub fn parse_string(value: &serde_json::Value, key: &str) -> Result<String, ConfigError> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(invalid(key, "Invalid string")),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        reason: reason.into(),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("{reason} for {key}")]
    InvalidValue { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.ticker.enabled);
        assert_eq!(config.ticker.tick_interval_ms, 60_000);
        assert_eq!(config.context.chars_per_token, 4);
        assert!(config.heartbeat_path().ends_with("HEARTBEAT.md"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[loop]"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/agent\"\n[loop]\ntick_interval_ms = 5000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/agent"));
        assert_eq!(config.ticker.tick_interval_ms, 5000);
        assert!(config.ticker.enabled);
        assert_eq!(config.heartbeat.poll_interval_ms, 15_000);
    }

    #[test]
    fn zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[heartbeat]\npoll_interval_ms = 0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loop\nenabled = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.ticker.tick_interval_ms, 60_000);
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CADENCE_DATA_DIR", "/var/lib/cadence"),
            ("CADENCE_TICK_INTERVAL_MS", "2500.9"),
            ("CADENCE_LOOP_ENABLED", "off"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/cadence"));
        assert_eq!(config.ticker.tick_interval_ms, 2500);
        assert!(!config.ticker.enabled);
    }

    #[test]
    fn bad_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|name| (name == "CADENCE_LOOP_ENABLED").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CADENCE_LOOP_ENABLED"));
    }

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(resolve_config_path(" Loop.TickIntervalMs "), Some(ConfigKey::TickIntervalMs));
        assert_eq!(resolve_config_path("agent.dataDir"), Some(ConfigKey::DataDir));
        assert_eq!(resolve_config_path("world.rpcUrl"), None);
    }

    #[test]
    fn positive_int_parsing() {
        assert_eq!(parse_positive_int(&json!(1500.7), "k").unwrap(), 1500);
        assert_eq!(parse_positive_int(&json!(" 42 "), "k").unwrap(), 42);
        assert!(parse_positive_int(&json!(0), "k").is_err());
        assert!(parse_positive_int(&json!(-5), "k").is_err());
        assert!(parse_positive_int(&json!(0.5), "k").is_err());
        assert!(parse_positive_int(&json!("fast"), "k").is_err());
        assert!(parse_positive_int(&json!(true), "k").is_err());
    }

    #[test]
    fn bool_and_string_parsing() {
        assert!(parse_bool(&json!("YES"), "k").unwrap());
        assert!(!parse_bool(&json!(false), "k").unwrap());
        assert!(parse_bool(&json!(1), "k").is_err());
        assert_eq!(parse_string(&json!("  /data  "), "k").unwrap(), "/data");
        assert!(parse_string(&json!("   "), "k").is_err());
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let mut config = AppConfig::default();
        assert!(config.set(ConfigKey::LoopEnabled, ConfigValue::Int(3)).is_err());
        config.set(ConfigKey::TickIntervalMs, ConfigValue::Int(10)).unwrap();
        assert_eq!(config.get(ConfigKey::TickIntervalMs), ConfigValue::Int(10));
    }
}
