//! Supported chat-completion backends.
//!
//! Every backend here speaks the OpenAI chat-completions dialect; the
//! differences are captured by `openai_compat::quirks`.

use std::env;

/// Supported API providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    /// Groq cloud inference
    #[default]
    Groq,
    /// Direct OpenAI API
    OpenAI,
    /// OpenRouter aggregator
    OpenRouter,
    /// Local Ollama instance
    Ollama,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::Groq,
        Provider::OpenAI,
        Provider::OpenRouter,
        Provider::Ollama,
    ];

    /// Lowercase ID for config storage.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenAI => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "groq" => Some(Provider::Groq),
            "openai" => Some(Provider::OpenAI),
            "openrouter" => Some(Provider::OpenRouter),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    /// Display name for prompts and messages.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Groq => "Groq",
            Provider::OpenAI => "OpenAI",
            Provider::OpenRouter => "OpenRouter",
            Provider::Ollama => "Ollama",
        }
    }

    /// Environment variable(s) holding the API key.
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::Groq => &["GROQ_API_KEY"],
            Provider::OpenAI => &["OPENAI_API_KEY"],
            Provider::OpenRouter => &["OPENROUTER_API_KEY"],
            Provider::Ollama => &[],
        }
    }

    /// Whether requests must carry a bearer token.
    pub fn requires_api_key(&self) -> bool {
        *self != Provider::Ollama
    }

    /// First non-empty API key found in the environment.
    pub fn api_key_from_env(&self) -> Option<String> {
        self.env_vars()
            .iter()
            .filter_map(|var| env::var(var).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
