//! Configuration types for duet engine.
//!
//! The configuration names the two backends, the reveal cadence and the
//! history slot. API keys never live in the file; each backend names the
//! environment variable holding its key, read once at startup.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::backends::{gemini, groq};
use crate::history::DEFAULT_HISTORY_FILE;
use crate::message::GREETING;

/// Main configuration for duet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend shown in the first column.
    #[serde(default = "default_backend_a")]
    pub backend_a: BackendConfig,

    /// Backend shown in the second column.
    #[serde(default = "default_backend_b")]
    pub backend_b: BackendConfig,

    /// Milliseconds between two revealed characters.
    #[serde(default = "default_reveal_tick_ms")]
    pub reveal_tick_ms: u64,

    /// Location of the history file.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Banner shown at the top of every new chat.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_backend_a() -> BackendConfig {
    BackendConfig::default_for(BackendKind::Gemini)
}

fn default_backend_b() -> BackendConfig {
    BackendConfig::default_for(BackendKind::Groq)
}

fn default_reveal_tick_ms() -> u64 {
    20
}

fn default_history_path() -> PathBuf {
    PathBuf::from(DEFAULT_HISTORY_FILE)
}

fn default_greeting() -> String {
    GREETING.into()
}

/// Which HTTP API a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Google Gemini `generateContent`.
    Gemini,
    /// Groq OpenAI-compatible chat completions.
    Groq,
}

/// Configuration for a single backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API flavour.
    pub kind: BackendKind,

    /// Label shown to the user and in failure messages.
    pub label: String,

    /// Model identifier.
    pub model: String,

    /// API host; the public endpoint when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl BackendConfig {
    /// Default configuration for a backend kind.
    pub fn default_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Gemini => Self {
                kind,
                label: "Gemini".into(),
                model: gemini::DEFAULT_MODEL.into(),
                base_url: None,
                api_key_env: "GEMINI_API_KEY".into(),
            },
            BackendKind::Groq => Self {
                kind,
                label: "Llama-3".into(),
                model: groq::DEFAULT_MODEL.into(),
                base_url: None,
                api_key_env: "GROQ_API_KEY".into(),
            },
        }
    }

    /// Read the API key from the environment.
    pub fn api_key(&self) -> Result<SecretString, ConfigError> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    /// Read the API key through a custom lookup.
    pub fn api_key_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SecretString, ConfigError> {
        lookup(&self.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingCredential(self.api_key_env.clone()))
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        std::fs::write(path, content).map_err(ConfigError::Io)
    }

    /// Reveal cadence as a duration. Zero disables the typewriter effect.
    pub fn reveal_tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reveal_tick_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_a: default_backend_a(),
            backend_b: default_backend_b(),
            reveal_tick_ms: default_reveal_tick_ms(),
            history_path: default_history_path(),
            greeting: default_greeting(),
        }
    }
}

/// Errors that can occur when working with configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading or writing config.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing config JSON.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// Error serializing config to JSON.
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Required API key not set.
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}
