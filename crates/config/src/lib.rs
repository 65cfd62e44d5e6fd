//! Configuration loading, validation, and management for Infrared.
//!
//! Loads configuration from `~/.infrared/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! [`AppConfig`] is passed explicitly into the orchestrator; nothing reads
//! configuration from ambient state after startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.infrared/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name (used for logging and well-known base URLs)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used for every phase unless overridden below
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Review loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Size ceilings and context budget
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Interactive session settings
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "deepseek".into()
}
fn default_model() -> String {
    "deepseek-reasoner".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
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
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("limits", &self.limits)
            .field("session", &self.session)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Implementation attempts per top-level request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Run the Planning phase before implementing
    #[serde(default = "default_true")]
    pub planning: bool,

    /// Feed dry-run validation failures back as review feedback instead of
    /// failing the request
    #[serde(default)]
    pub repair_invalid_edits: bool,

    /// Model for the Planning phase (falls back to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_model: Option<String>,

    /// Model for the Review phase (falls back to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_model: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            planning: true,
            repair_invalid_edits: false,
            planning_model: None,
            review_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest file content the materializer will write, in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Conversation budget in estimated tokens
    #[serde(default = "default_context_budget")]
    pub context_budget_tokens: usize,

    /// Maximum user/assistant pairs retained in history
    #[serde(default = "default_max_history_pairs")]
    pub max_history_pairs: usize,
}

fn default_max_file_bytes() -> usize {
    5_000_000
}
fn default_context_budget() -> usize {
    64_000
}
fn default_max_history_pairs() -> usize {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            context_budget_tokens: default_context_budget(),
            max_history_pairs: default_max_history_pairs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory all relative file paths resolve against
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Stack notes loaded into context at startup, if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_stack_file: Option<PathBuf>,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            tech_stack_file: Some(PathBuf::from("tech_stack.md")),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.infrared/config.toml).
    ///
    /// Also checks environment variables:
    /// - `INFRARED_API_KEY` (highest priority), then `DEEPSEEK_API_KEY`
    /// - `INFRARED_MODEL`, `INFRARED_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through a lookup function.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("INFRARED_API_KEY").or_else(|| lookup("DEEPSEEK_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("INFRARED_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("INFRARED_API_URL") {
            self.api_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".infrared")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_attempts must be at least 1".into(),
            ));
        }
        if self.limits.max_file_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_bytes must be > 0".into(),
            ));
        }
        if self.limits.context_budget_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "limits.context_budget_tokens must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            orchestrator: OrchestratorConfig::default(),
            limits: LimitsConfig::default(),
            session: SessionConfig::default(),
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

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
