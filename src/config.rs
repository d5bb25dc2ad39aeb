//! Configuration management for the relay bot.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `RELAYBOT__<SECTION>__<KEY>` environment variables. The two credentials
//! also fall back to the conventional `TELEGRAM_TOKEN` and
//! `OPENROUTER_API_KEY` variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RelayError, Result};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RELAYBOT";
/// Fallback variable for the Telegram bot token.
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_TOKEN";
/// Fallback variable for the OpenRouter API key.
pub const OPENROUTER_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Main configuration for the relay bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Chat transport configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Generation backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Quota and memory limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub token: Option<String>,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Long-poll timeout for getUpdates, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Largest text segment sent in one message
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Pause between segments of a long reply, in milliseconds
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout(),
            max_message_chars: default_max_message_chars(),
            chunk_delay_ms: default_chunk_delay(),
        }
    }
}

impl TelegramConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_max_message_chars() -> usize {
    4096
}

fn default_chunk_delay() -> u64 {
    1000
}

/// Chat-completions backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Bearer token for the backend
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// System instruction prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Value of the `HTTP-Referer` attribution header
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value of the `X-Title` attribution header
    #[serde(default = "default_title")]
    pub title: String,

    /// Upper bound on a single generation call, in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_backend_base_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            referer: default_referer(),
            title: default_title(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_backend_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-chat-v3-0324:free".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Always reply in plain text.".to_string()
}

fn default_referer() -> String {
    "https://github.com/bcelenza/relaybot".to_string()
}

fn default_title() -> String {
    "Relaybot".to_string()
}

fn default_backend_timeout() -> u64 {
    120
}

/// Quota and conversation memory limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests admitted per window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,

    /// Rate-limit window length, in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Turns of history kept per user
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Silence that clears history, in seconds
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            window_secs: default_window(),
            max_turns: default_max_turns(),
            inactivity_timeout_secs: default_inactivity_timeout(),
        }
    }
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

fn default_request_limit() -> u32 {
    crate::ratelimit::REQUEST_LIMIT
}

fn default_window() -> u64 {
    crate::ratelimit::WINDOW.as_secs()
}

fn default_max_turns() -> usize {
    crate::session::MAX_TURNS
}

fn default_inactivity_timeout() -> u64 {
    crate::session::INACTIVITY_TIMEOUT.as_secs()
}

impl RelayConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: RelayConfig = builder.build()?.try_deserialize()?;
        config.apply_credential_fallbacks(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RelayError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Fill missing credentials from `lookup`.
    pub fn apply_credential_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.telegram.token.is_none() {
            self.telegram.token = lookup(TELEGRAM_TOKEN_VAR);
        }
        if self.backend.api_key.is_none() {
            self.backend.api_key = lookup(OPENROUTER_KEY_VAR);
        }
    }

    /// Check that the configuration can run a bot.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.as_deref().map_or(true, str::is_empty) {
            return Err(RelayError::Config(format!(
                "Telegram token missing; set {} or telegram.token",
                TELEGRAM_TOKEN_VAR
            )));
        }
        if self.backend.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(RelayError::Config(format!(
                "Backend API key missing; set {} or backend.api_key",
                OPENROUTER_KEY_VAR
            )));
        }
        if self.limits.request_limit == 0 || self.limits.window_secs == 0 {
            return Err(RelayError::Config(
                "limits.request_limit and limits.window_secs must be positive".to_string(),
            ));
        }
        if self.limits.max_turns == 0 {
            return Err(RelayError::Config("limits.max_turns must be positive".to_string()));
        }
        if self.telegram.max_message_chars == 0 {
            return Err(RelayError::Config(
                "telegram.max_message_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
