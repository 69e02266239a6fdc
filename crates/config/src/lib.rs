//! Configuration loading, validation, and management for Foldline.
//!
//! Loads configuration from `~/.foldline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.foldline/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent core tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Where session event logs live
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (overridden by `FOLDLINE_API_KEY` / `OPENAI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI Responses-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f32>,

    /// System prompt for new sessions
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help.".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: None,
            system_prompt: default_system_prompt(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the bounded channel between a provider stream and its consumer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// Maximum rounds of rule-emitted appends handled within one `add_events`
    #[serde(default = "default_max_rule_cascade")]
    pub max_rule_cascade: usize,

    /// Live background task count above which a warning is logged
    #[serde(default = "default_background_soft_limit")]
    pub background_soft_limit: usize,
}

fn default_stream_buffer() -> usize {
    64
}
fn default_max_rule_cascade() -> usize {
    32
}
fn default_background_soft_limit() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_buffer: default_stream_buffer(),
            max_rule_cascade: default_max_rule_cascade(),
            background_soft_limit: default_background_soft_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Session directory; defaults to `~/.foldline/sessions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// The session directory in effect.
    pub fn sessions_dir(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.foldline/config.toml).
    ///
    /// Environment overrides:
    /// - `FOLDLINE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `FOLDLINE_MODEL`
    /// - `FOLDLINE_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("FOLDLINE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("FOLDLINE_MODEL") {
            self.provider.default_model = model;
        }
        if let Some(url) = lookup("FOLDLINE_API_URL") {
            self.provider.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".foldline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.provider.default_temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.engine.stream_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "engine.stream_buffer must be > 0".into(),
            ));
        }

        if self.engine.max_rule_cascade == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_rule_cascade must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.stream_buffer, 64);
        assert_eq!(config.engine.max_rule_cascade, 32);
        assert_eq!(config.store.backend, StoreBackend::File);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.default_model, config.provider.default_model);
        assert_eq!(parsed.engine.background_soft_limit, 256);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.default_temperature = Some(5.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_stream_buffer_rejected() {
        let mut config = AppConfig::default();
        config.engine.stream_buffer = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.default_model, "gpt-4.1");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[provider]
default_model = "gpt-4.1-mini"

[store]
backend = "memory"

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider.default_model, "gpt-4.1-mini");
        assert_eq!(config.provider.api_url, "https://api.openai.com/v1");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.engine.stream_buffer, 64);
    }

    #[test]
    fn unparsable_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("FOLDLINE_API_KEY", "sk-foldline"),
            ("FOLDLINE_MODEL", "o4-mini"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-foldline"));
        assert_eq!(config.provider.default_model, "o4-mini");
        assert_eq!(config.provider.api_url, "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("stream_buffer = 64"));
        assert!(toml_str.contains("gpt-4.1"));
    }
}
