//! Configuration loading, validation, and management for Cardwise.
//!
//! Loads configuration from `~/.cardwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cardwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Intent classification collaborator
    #[serde(default)]
    pub classifier: CollaboratorConfig,

    /// Summarization collaborator
    #[serde(default)]
    pub summarizer: CollaboratorConfig,

    /// Active card retention policy
    #[serde(default)]
    pub working_set: WorkingSetConfig,

    /// History compaction cadence
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Confidence fusion constants
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// Bounded retry around every provider call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Request rate limiting around every provider call
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Prompt assembly
    #[serde(default)]
    pub prompt: PromptConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name used in logs and as the rate-limit scope
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings for an optional provider-backed collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model override; falls back to `provider.model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_collaborator_temperature")]
    pub temperature: f32,
}

fn default_collaborator_temperature() -> f32 {
    0.0
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            temperature: default_collaborator_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingSetConfig {
    /// Number of most recent persisted messages scanned for citations
    #[serde(default = "default_decay_window")]
    pub decay_window: usize,

    /// Loaded cards at or above this relevance stay active without a citation
    #[serde(default = "default_high_relevance")]
    pub high_relevance: u8,
}

fn default_decay_window() -> usize {
    10
}
fn default_high_relevance() -> u8 {
    80
}

impl Default for WorkingSetConfig {
    fn default() -> Self {
        Self {
            decay_window: default_decay_window(),
            high_relevance: default_high_relevance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Message count at which the first compaction runs
    #[serde(default = "default_compaction_threshold")]
    pub threshold: u64,

    /// After the threshold, compaction runs on multiples of this
    #[serde(default = "default_compaction_interval")]
    pub interval: u64,

    /// Maximum number of recent messages handed to the summarizer
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_compaction_threshold() -> u64 {
    10
}
fn default_compaction_interval() -> u64 {
    5
}
fn default_history_cap() -> usize {
    20
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_compaction_threshold(),
            interval: default_compaction_interval(),
            history_cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Confidence reported with no citations when a knowledge base exists
    #[serde(default = "default_baseline_with_kb")]
    pub baseline_with_knowledge_base: u8,

    /// Confidence reported with no citations and no knowledge base
    #[serde(default = "default_baseline_without_kb")]
    pub baseline_without_knowledge_base: u8,

    /// Source trust for cards that declare none
    #[serde(default = "default_card_confidence")]
    pub default_card_confidence: u8,

    /// Relevance assumed for cited cards missing from this turn's map
    #[serde(default = "default_relevance")]
    pub default_relevance: u8,
}

fn default_baseline_with_kb() -> u8 {
    65
}
fn default_baseline_without_kb() -> u8 {
    50
}
fn default_card_confidence() -> u8 {
    70
}
fn default_relevance() -> u8 {
    50
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            baseline_with_knowledge_base: default_baseline_with_kb(),
            baseline_without_knowledge_base: default_baseline_without_kb(),
            default_card_confidence: default_card_confidence(),
            default_relevance: default_relevance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    60
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.cardwise/cardwise.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The database path, falling back to the config directory.
    pub fn resolved_path(&self) -> String {
        self.path.clone().unwrap_or_else(|| {
            AppConfig::config_dir()
                .join("cardwise.sqlite")
                .to_string_lossy()
                .into_owned()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Assistant persona placed at the top of the system message
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Token budget for replayed conversation history
    #[serde(default = "default_history_tokens")]
    pub history_token_budget: usize,

    /// Maximum number of past messages considered for replay
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
}

fn default_persona() -> String {
    "You are a helpful assistant for a business. Ground your answers in the \
     knowledge cards provided and follow any voice or compliance guidance they contain."
        .into()
}
fn default_history_tokens() -> usize {
    1500
}
fn default_history_messages() -> usize {
    20
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            history_token_budget: default_history_tokens(),
            history_messages: default_history_messages(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cardwise/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CARDWISE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CARDWISE_API_URL`, `CARDWISE_MODEL`
    /// - `CARDWISE_DB` (SQLite path)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("CARDWISE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("CARDWISE_API_URL") {
            self.provider.api_url = url;
        }

        if let Ok(model) = std::env::var("CARDWISE_MODEL") {
            self.provider.model = model;
        }

        if let Ok(path) = std::env::var("CARDWISE_DB") {
            self.store.path = Some(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cardwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.working_set.high_relevance > 100 {
            return Err(ConfigError::ValidationError(
                "working_set.high_relevance must be at most 100".into(),
            ));
        }

        if self.compaction.interval == 0 {
            return Err(ConfigError::ValidationError(
                "compaction.interval must be > 0".into(),
            ));
        }

        if self.compaction.history_cap == 0 {
            return Err(ConfigError::ValidationError(
                "compaction.history_cap must be > 0".into(),
            ));
        }

        let c = &self.confidence;
        for (name, value) in [
            ("baseline_with_knowledge_base", c.baseline_with_knowledge_base),
            ("baseline_without_knowledge_base", c.baseline_without_knowledge_base),
            ("default_card_confidence", c.default_card_confidence),
            ("default_relevance", c.default_relevance),
        ] {
            if value > 100 {
                return Err(ConfigError::ValidationError(format!(
                    "confidence.{name} must be at most 100"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests must be > 0 when rate limiting is enabled".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store.backend '{}' (expected sqlite or in_memory)",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Model for the classifier, falling back to the provider default.
    pub fn classifier_model(&self) -> &str {
        self.classifier.model.as_deref().unwrap_or(&self.provider.model)
    }

    /// Model for the summarizer, falling back to the provider default.
    pub fn summarizer_model(&self) -> &str {
        self.summarizer.model.as_deref().unwrap_or(&self.provider.model)
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
