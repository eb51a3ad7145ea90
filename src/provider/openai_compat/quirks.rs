//! Where the OpenAI-compatible providers disagree.

use crate::provider::api_provider::Provider;

/// Request field that carries the output token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenField {
    MaxTokens,
    /// OpenAI's newer name; the older one is rejected by its reasoning models.
    MaxCompletionTokens,
}

#[derive(Debug, Clone)]
pub struct ProviderQuirks {
    pub base_url: &'static str,
    pub token_field: TokenField,
    /// Role name for the system prompt (`system` or OpenAI's `developer`).
    pub system_role: &'static str,
    /// Whether `reasoning_content` / `reasoning` are surfaced as thinking.
    pub reasoning: bool,
    /// Send `stream_options.include_usage`. Groq reports usage on its own.
    pub stream_usage: bool,
}

impl ProviderQuirks {
    pub fn for_provider(provider: Provider) -> Self {
        let (base_url, token_field, system_role, reasoning, stream_usage) = match provider {
            Provider::Groq => (
                "https://api.groq.com/openai/v1",
                TokenField::MaxTokens,
                "system",
                true,
                false,
            ),
            Provider::OpenAI => (
                "https://api.openai.com/v1",
                TokenField::MaxCompletionTokens,
                "developer",
                false,
                true,
            ),
            Provider::OpenRouter => (
                "https://openrouter.ai/api/v1",
                TokenField::MaxCompletionTokens,
                "system",
                true,
                true,
            ),
            Provider::Ollama => (
                "http://localhost:11434/v1",
                TokenField::MaxTokens,
                "system",
                false,
                false,
            ),
        };

        Self {
            base_url,
            token_field,
            system_role,
            reasoning,
            stream_usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groq_quirks() {
        let quirks = ProviderQuirks::for_provider(Provider::Groq);
        assert_eq!(quirks.token_field, TokenField::MaxTokens);
        assert_eq!(quirks.system_role, "system");
        assert_eq!(quirks.base_url, "https://api.groq.com/openai/v1");
        assert!(!quirks.stream_usage);
    }

    #[test]
    fn test_openai_quirks() {
        let quirks = ProviderQuirks::for_provider(Provider::OpenAI);
        assert_eq!(quirks.token_field, TokenField::MaxCompletionTokens);
        assert_eq!(quirks.system_role, "developer");
        assert!(quirks.stream_usage);
    }

    #[test]
    fn test_ollama_is_local() {
        let quirks = ProviderQuirks::for_provider(Provider::Ollama);
        assert!(quirks.base_url.starts_with("http://localhost"));
    }
}
