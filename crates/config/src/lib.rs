//! Configuration loading, validation, and management for Sotto.
//!
//! Loads configuration from `~/.sotto/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.sotto/config.toml`.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// System prompt for the assistant persona
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Language-model provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech-recognition provider settings
    #[serde(default)]
    pub stt: SttConfig,

    /// Speech-synthesis provider settings
    #[serde(default)]
    pub tts: TtsConfig,

    /// Conversation-context budget settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Orchestration-engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Conversation-state persistence settings
    #[serde(default)]
    pub state: StateConfig,

    /// Tool autonomy and sandboxing settings
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Provider retry/backoff settings
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

fn default_system_prompt() -> String {
    concat!(
        "You are Sotto, a private voice assistant running entirely on the user's machine. ",
        "You have access to tools that let you work with files, applications, and the web. ",
        "Use them when appropriate. Answers are spoken aloud, so keep them short and natural.",
    )
    .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("llm", &self.llm)
            .field("stt", &self.stt)
            .field("tts", &self.tts)
            .field("context", &self.context)
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("autonomy", &self.autonomy)
            .field("resilience", &self.resilience)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint base URL
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    /// API key, if the endpoint requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Reduced-capability model used for the resource-exhaustion fallback
    #[serde(default)]
    pub fallback_model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_url() -> String {
    "http://127.0.0.1:8080/v1".into()
}
fn default_llm_model() -> String {
    "qwen2.5-7b-instruct".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            api_key: None,
            model: default_llm_model(),
            fallback_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Whisper-compatible endpoint base URL
    #[serde(default = "default_stt_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_stt_model")]
    pub model: String,

    /// Fixed recognition language; `None` lets the provider detect
    #[serde(default)]
    pub language: Option<String>,
}

fn default_stt_url() -> String {
    "http://127.0.0.1:8081/v1".into()
}
fn default_stt_model() -> String {
    "whisper-small".into()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: default_stt_url(),
            api_key: None,
            model: default_stt_model(),
            language: None,
        }
    }
}

impl std::fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SttConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Speech endpoint base URL
    #[serde(default = "default_tts_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_tts_url() -> String {
    "http://127.0.0.1:8082/v1".into()
}
fn default_tts_model() -> String {
    "piper-en".into()
}
fn default_voice() -> String {
    "default".into()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: default_tts_url(),
            api_key: None,
            model: default_tts_model(),
            voice: default_voice(),
        }
    }
}

impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum retained messages before pruning
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Message count at which summarization (rather than plain discard)
    /// kicks in, when a summarizer is configured
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,

    /// How many recent messages each model call sees
    #[serde(default = "default_snapshot_window")]
    pub snapshot_window: usize,

    /// How many important messages a snapshot may carry beyond the window
    #[serde(default = "default_important_slack")]
    pub important_slack: usize,
}

fn default_max_messages() -> usize {
    20
}
fn default_summarize_threshold() -> usize {
    30
}
fn default_snapshot_window() -> usize {
    16
}
fn default_important_slack() -> usize {
    8
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            summarize_threshold: default_summarize_threshold(),
            snapshot_window: default_snapshot_window(),
            important_slack: default_important_slack(),
        }
    }
}

/// Whether tool schemas are offered to the model on every call or gated by
/// a keyword heuristic (which also enables streaming of tool-free turns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGating {
    #[default]
    Always,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum decide → tools → decide iterations per turn
    #[serde(default = "default_max_tool_depth")]
    pub max_tool_depth: u32,

    /// Stream tool-free turns and synthesize per sentence
    #[serde(default = "default_true")]
    pub streaming: bool,

    #[serde(default)]
    pub tool_gating: ToolGating,
}

fn default_max_tool_depth() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_depth: default_max_tool_depth(),
            streaming: true,
            tool_gating: ToolGating::Always,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Persistence backend: "file", "sqlite", or "none"
    #[serde(default = "default_state_backend")]
    pub backend: String,

    /// Directory holding state files / the SQLite database
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,

    /// Minimum milliseconds between saves; 0 saves on every turn
    #[serde(default)]
    pub debounce_ms: u64,
}

fn default_state_backend() -> String {
    "file".into()
}

fn default_state_dir() -> PathBuf {
    home_dir().join(".sotto").join("state")
}

/// Resolve the user's home directory, falling back to the current directory.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_state_backend(),
            dir: default_state_dir(),
            debounce_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Applications `launch_app` may start. Empty = deny all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Roots the file tools may touch. Empty = allow all.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    /// Path prefixes the file tools must never touch.
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// Directory scanned for plugin tool manifests.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,
}

fn default_allowed_commands() -> Vec<String> {
    ["xdg-open", "open", "firefox", "code"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_forbidden_paths() -> Vec<String> {
    ["~/.ssh", "~/.gnupg", "/etc/shadow", "/etc/sudoers"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_plugin_dir() -> PathBuf {
    home_dir().join(".sotto").join("plugins")
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            allowed_roots: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
            plugin_dir: default_plugin_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Default config file location: `~/.sotto/config.toml`.
    pub fn default_path() -> PathBuf {
        home_dir().join(".sotto").join("config.toml")
    }

    /// Load configuration from the default path. Missing file = defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific path. Missing file = defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default_with_prompt()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn default_with_prompt() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            ..Self::default()
        }
    }

    /// Environment variables override the file:
    /// `SOTTO_API_KEY`, `SOTTO_MODEL`, `SOTTO_STATE_DIR`.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SOTTO_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("SOTTO_MODEL") {
            self.llm.model = model;
        }
        if let Ok(dir) = std::env::var("SOTTO_STATE_DIR") {
            self.state.dir = PathBuf::from(dir);
        }
    }

    /// Validate settings that would otherwise fail deep inside a turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.max_messages < 2 {
            return Err(ConfigError::Invalid(
                "context.max_messages must be at least 2".into(),
            ));
        }
        if self.context.summarize_threshold < self.context.max_messages {
            return Err(ConfigError::Invalid(
                "context.summarize_threshold must be >= context.max_messages".into(),
            ));
        }
        if self.context.snapshot_window == 0 {
            return Err(ConfigError::Invalid(
                "context.snapshot_window must be positive".into(),
            ));
        }
        if self.engine.max_tool_depth == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_tool_depth must be positive".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        match self.state.backend.as_str() {
            "file" | "sqlite" | "none" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "state.backend '{other}' is not one of: file, sqlite, none"
                )));
            }
        }
        Ok(())
    }

    /// A commented starter config, written by `sotto onboard`.
    pub fn starter_toml() -> String {
        concat!(
            "# Sotto configuration\n",
            "#\n",
            "# All providers default to local OpenAI-compatible servers:\n",
            "#   llm  — llama.cpp server / Ollama on :8080\n",
            "#   stt  — whisper-server on :8081\n",
            "#   tts  — speech server on :8082\n",
            "\n",
            "[llm]\n",
            "base_url = \"http://127.0.0.1:8080/v1\"\n",
            "model = \"qwen2.5-7b-instruct\"\n",
            "# fallback_model = \"qwen2.5-1.5b-instruct\"\n",
            "\n",
            "[context]\n",
            "max_messages = 20\n",
            "summarize_threshold = 30\n",
            "\n",
            "[engine]\n",
            "max_tool_depth = 5\n",
            "streaming = true\n",
            "tool_gating = \"always\"\n",
            "\n",
            "[state]\n",
            "backend = \"file\"\n",
            "\n",
            "[autonomy]\n",
            "allowed_commands = [\"xdg-open\", \"firefox\"]\n",
            "forbidden_paths = [\"~/.ssh\", \"~/.gnupg\"]\n",
        )
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default_with_prompt();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.max_tool_depth, 5);
        assert_eq!(config.context.max_messages, 20);
        assert_eq!(config.engine.tool_gating, ToolGating::Always);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/sotto/config.toml")).unwrap();
        assert_eq!(config.llm.model, "qwen2.5-7b-instruct");
        assert!(!config.system_prompt.is_empty());
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "[llm]\nmodel = \"mistral-7b\"\n\n[engine]\nmax_tool_depth = 3\ntool_gating = \"heuristic\"\n"
        )
        .unwrap();

        let config = AppConfig::load_from(f.path()).unwrap();
        assert_eq!(config.llm.model, "mistral-7b");
        assert_eq!(config.engine.max_tool_depth, 3);
        assert_eq!(config.engine.tool_gating, ToolGating::Heuristic);
        // Untouched sections keep their defaults
        assert_eq!(config.context.max_messages, 20);
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut config = AppConfig::default_with_prompt();
        config.context.max_messages = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default_with_prompt();
        config.engine.max_tool_depth = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default_with_prompt();
        config.state.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn summarize_threshold_below_max_rejected() {
        let mut config = AppConfig::default_with_prompt();
        config.context.max_messages = 40;
        config.context.summarize_threshold = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default_with_prompt();
        config.llm.api_key = Some("sk-secret-key".into());
        let dump = format!("{config:?}");
        assert!(!dump.contains("sk-secret-key"));
        assert!(dump.contains("[REDACTED]"));
    }

    #[test]
    fn starter_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::starter_toml()).unwrap();
        assert!(config.validate().is_ok());
    }
}
