//! Configuration management for OMAA.
//!
//! Loads settings from `~/.config/omaa/config.toml` with environment overrides.

use crate::provider::ProviderId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Trial constants (single source of truth)
pub const DEFAULT_MESSAGE_LIMIT: u32 = 20;
pub const DEFAULT_TRIAL_PERIOD_DAYS: u32 = 7;
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub trial: TrialConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL the chat client uses to reach the gateway.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub openai: Option<String>,
    #[serde(default)]
    pub anthropic: Option<String>,
    #[serde(default)]
    pub deepseek: Option<String>,
}

impl ApiKeysConfig {
    /// Credential for a provider, if configured.
    pub fn key_for(&self, provider: ProviderId) -> Option<String> {
        match provider {
            ProviderId::OpenAi => self.openai.clone(),
            ProviderId::Anthropic => self.anthropic.clone(),
            ProviderId::DeepSeek => self.deepseek.clone(),
        }
    }

    /// Whether a credential is configured for a provider.
    pub fn is_configured(&self, provider: ProviderId) -> bool {
        self.key_for(provider).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StripeConfig {
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
    #[serde(default = "default_trial_period_days")]
    pub trial_period_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Override for the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialConfig {
    #[serde(default = "default_message_limit")]
    pub message_limit: u32,
}

// Default value functions
fn default_port() -> u16 {
    8787
}
fn default_success_url() -> String {
    "https://omaa.app/chat?status=success&session_id={CHECKOUT_SESSION_ID}".to_string()
}
fn default_cancel_url() -> String {
    "https://omaa.app/pricing".to_string()
}
fn default_trial_period_days() -> u32 {
    DEFAULT_TRIAL_PERIOD_DAYS
}
fn default_system_prompt() -> String {
    "You are OMaa, a concise and helpful assistant.".to_string()
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_message_limit() -> u32 {
    DEFAULT_MESSAGE_LIMIT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            url: None,
        }
    }
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            price_id: None,
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
            trial_period_days: default_trial_period_days(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            provider: default_provider(),
            model: None,
            history_cap: default_history_cap(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omaa")
            .join("config.toml")
    }

    /// Get the default data directory (conversation history, client state).
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omaa")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config with environment overrides applied (convenience method).
    pub fn load_with_env() -> Self {
        Self::load().unwrap_or_default().with_env_overrides()
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.api_keys.anthropic = Some(key);
        }
        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
            self.api_keys.deepseek = Some(key);
        }
        if let Ok(key) = std::env::var("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = Some(key);
        }
        if let Ok(key) = std::env::var("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = Some(key);
        }
        if let Ok(id) = std::env::var("STRIPE_PRICE_ID") {
            self.stripe.price_id = Some(id);
        }
        if let Ok(val) = std::env::var("OMAA_MESSAGE_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.trial.message_limit = limit;
            }
        }
        self
    }

    /// Save config to file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }

    /// Base URL the chat client should use to reach the gateway.
    pub fn gateway_url(&self) -> String {
        self.gateway
            .url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.gateway.port))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
