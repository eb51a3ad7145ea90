use crate::agent::{DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_SYSTEM_PROMPT};
use crate::provider::Provider;
use crate::session::{HistoryMode, SessionConfig};
use crate::tool::builtin::WikipediaOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_GREETING: &str = "I'm MathGPT. What can I calculate for you?";

/// Keys accepted by `config get` / `config set`.
pub const KEYS: &[&str] = &[
    "provider",
    "model",
    "base_url",
    "system_prompt",
    "greeting",
    "history",
    "stream",
    "max_tool_rounds",
    "max_tokens",
    "temperature",
    "wikipedia.language",
    "wikipedia.top_k_results",
    "wikipedia.doc_content_chars_max",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// User settings. No credential is ever stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider id: groq, openai, openrouter, or ollama.
    pub provider: String,
    pub model: String,
    /// Override the provider's API base URL (proxies, local servers).
    pub base_url: Option<String>,
    pub system_prompt: String,
    /// Seeded assistant turn. Empty disables it.
    pub greeting: String,
    pub history: HistoryMode,
    /// Stream replies as they are generated.
    pub stream: bool,
    /// Cap on model/tool round trips per submission.
    pub max_tool_rounds: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub wikipedia: WikipediaOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default().id().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            history: HistoryMode::Full,
            stream: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tokens: None,
            temperature: None,
            wikipedia: WikipediaOptions::default(),
        }
    }
}

/// `<config_dir>/mathgpt/config.toml`, or `.mathgpt/config.toml` when the
/// platform has no config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("mathgpt").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".mathgpt/config.toml"))
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.check_limits()?;
        Ok(config)
    }

    /// Counts that make the assistant useless at zero.
    fn check_limits(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_tool_rounds", self.max_tool_rounds),
            ("wikipedia.top_k_results", self.wikipedia.top_k_results),
            ("wikipedia.doc_content_chars_max", self.wikipedia.doc_content_chars_max),
        ];
        match limits.into_iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(invalid(key, "must be at least 1")),
            None => Ok(()),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn provider(&self) -> Result<Provider, ConfigError> {
        Provider::from_id(&self.provider).ok_or_else(|| invalid("provider", unknown_provider(&self.provider)))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            greeting: (!self.greeting.trim().is_empty()).then(|| self.greeting.clone()),
            history: self.history,
        }
    }

    /// Current value of a key, rendered for display. Unset optionals print empty.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "provider" => self.provider.clone(),
            "model" => self.model.clone(),
            "base_url" => self.base_url.clone().unwrap_or_default(),
            "system_prompt" => self.system_prompt.clone(),
            "greeting" => self.greeting.clone(),
            "history" => match self.history {
                HistoryMode::Full => "full".to_string(),
                HistoryMode::Latest => "latest".to_string(),
            },
            "stream" => self.stream.to_string(),
            "max_tool_rounds" => self.max_tool_rounds.to_string(),
            "max_tokens" => self.max_tokens.map(|v| v.to_string()).unwrap_or_default(),
            "temperature" => self.temperature.map(|v| v.to_string()).unwrap_or_default(),
            "wikipedia.language" => self.wikipedia.language.clone(),
            "wikipedia.top_k_results" => self.wikipedia.top_k_results.to_string(),
            "wikipedia.doc_content_chars_max" => self.wikipedia.doc_content_chars_max.to_string(),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        };
        Ok(value)
    }

    /// Parse and assign one key. An empty value clears optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "provider" => {
                let provider =
                    Provider::from_id(value).ok_or_else(|| invalid(key, unknown_provider(value)))?;
                self.provider = provider.id().to_string();
            }
            "model" => {
                if value.is_empty() {
                    return Err(invalid(key, "must not be empty"));
                }
                self.model = value.to_string();
            }
            "base_url" => self.base_url = (!value.is_empty()).then(|| value.to_string()),
            "system_prompt" => self.system_prompt = value.to_string(),
            "greeting" => self.greeting = value.to_string(),
            "history" => self.history = value.parse().map_err(|e: String| invalid(key, e))?,
            "stream" => self.stream = parse(key, value)?,
            "max_tool_rounds" => self.max_tool_rounds = parse_positive(key, value)?,
            "max_tokens" => self.max_tokens = parse_optional(key, value)?,
            "temperature" => self.temperature = parse_optional(key, value)?,
            "wikipedia.language" => {
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(invalid(key, "expected a language code such as 'en'"));
                }
                self.wikipedia.language = value.to_string();
            }
            "wikipedia.top_k_results" => self.wikipedia.top_k_results = parse_positive(key, value)?,
            "wikipedia.doc_content_chars_max" => {
                self.wikipedia.doc_content_chars_max = parse_positive(key, value)?;
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn unknown_provider(id: &str) -> String {
    let known: Vec<_> = Provider::ALL.iter().map(Provider::id).collect();
    format!("unknown provider '{id}' (expected one of {})", known.join(", "))
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    match parse(key, value)? {
        0 => Err(invalid(key, "must be at least 1")),
        n => Ok(n),
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, e.to_string()))
}

fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if value.is_empty() {
        return Ok(None);
    }
    parse(key, value).map(Some)
}
