//! Chat endpoint configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists, then environment
//! overrides are applied on top.

use crate::error::{Error, Result};
use crate::types::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ChatGPT, a large language model trained by OpenAI. \
Follow the user's instructions carefully. Respond using markdown.";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_API_HOST: &str = "https://api.openai.com";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub gateway: GatewayConfig,
    /// Values substituted when a request leaves them out.
    pub defaults: DefaultsConfig,
    /// Token budgeting and trimming parameters.
    pub window: WindowConfig,
    /// Completion service connection.
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub system_prompt: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Tokens held back for the model's reply. Also sent as `max_tokens`.
    pub reserved_reply_tokens: u32,
    /// Average characters per token, used by the char-estimate trim.
    pub chars_per_token: usize,
    /// Characters removed per fine-trim pass.
    pub trim_chunk_chars: usize,
    pub strategy: TrimStrategy,
    pub on_exhausted: ExhaustedPolicy,
    /// `cl100k_base` or `o200k_base`.
    pub encoding: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_host: Option<String>,
    /// Used when a request arrives without a key.
    pub api_key: Option<String>,
    pub organization: Option<String>,
}

/// First-phase estimate for how much of an overflowing message to cut.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrimStrategy {
    /// Cut `ceil(chars * overflow / tokens)` characters.
    #[default]
    Proportional,
    /// Cut `overflow * chars_per_token` characters; a message shorter than
    /// that is treated as exhausted outright.
    CharEstimate,
}

/// What happens when a message trims down to nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Exclude it and every older message.
    #[default]
    StopScan,
    /// Exclude only this message and keep scanning.
    SkipMessage,
}

// ============================================================
// Defaults
// ============================================================

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            reserved_reply_tokens: 1000,
            chars_per_token: 4,
            trim_chunk_chars: 500,
            strategy: TrimStrategy::default(),
            on_exhausted: ExhaustedPolicy::default(),
            encoding: "cl100k_base".into(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl ChatConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get("OPENAI_API_HOST") {
            self.upstream.api_host = Some(host);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(org) = get("OPENAI_ORGANIZATION") {
            self.upstream.organization = Some(org);
        }
        if let Some(prompt) = get("DEFAULT_SYSTEM_PROMPT") {
            self.defaults.system_prompt = prompt;
        }
        if let Some(raw) = get("DEFAULT_TEMPERATURE") {
            match raw.parse::<f32>() {
                Ok(t) => self.defaults.temperature = t,
                Err(_) => tracing::warn!("Ignoring DEFAULT_TEMPERATURE={:?}: not a number", raw),
            }
        }
        self
    }

    pub fn api_host(&self) -> &str {
        self.upstream.api_host.as_deref().unwrap_or(DEFAULT_API_HOST)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Write the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        tracing::info!("Wrote config to {}", path.display());
        Ok(())
    }
}
