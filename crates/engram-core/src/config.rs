//! Model endpoint configuration
//!
//! TigerStyle: Explicit configuration, fail loud at construction time.

use crate::error::{Error, Result};
use crate::provider::{detect_provider, EnvSnapshot, Provider};

/// Default model request timeout
pub const LLM_TIMEOUT_SECS_DEFAULT: u64 = 60;

/// Configuration for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier (e.g. "gpt-4o-mini", "deepseek-chat")
    pub model: String,
    /// API key
    pub api_key: String,
    /// Base URL of the endpoint, without the `/chat/completions` suffix
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Detected or explicitly chosen provider
    pub provider: Provider,
}

impl LlmConfig {
    /// Create a config with explicit values; the provider is detected from
    /// the base URL and key.
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        let base_url = base_url.into();
        let provider = detect_provider(
            None,
            Some(&base_url),
            Some(&api_key),
            &EnvSnapshot::empty(),
        );
        Self {
            model: model.into(),
            api_key,
            base_url,
            timeout_secs: LLM_TIMEOUT_SECS_DEFAULT,
            provider,
        }
    }

    /// Load from `LLM_MODEL_ID`, `LLM_API_KEY`, `LLM_BASE_URL` and
    /// `LLM_TIMEOUT`. Missing required keys fail loud.
    pub fn from_env() -> Result<Self> {
        let model = require_env("LLM_MODEL_ID")?;
        let api_key = require_env("LLM_API_KEY")?;
        let base_url = require_env("LLM_BASE_URL")?;

        let timeout_secs = match std::env::var("LLM_TIMEOUT") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| Error::InvalidConfiguration {
                    field: "LLM_TIMEOUT".to_string(),
                    reason: format!("expected seconds as an integer, got '{}'", raw),
                })?,
            Err(_) => LLM_TIMEOUT_SECS_DEFAULT,
        };

        let provider = detect_provider(
            None,
            Some(&base_url),
            Some(&api_key),
            &EnvSnapshot::from_env(),
        );

        Ok(Self {
            model,
            api_key,
            base_url,
            timeout_secs,
            provider,
        })
    }

    /// Override the detected provider
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Override the timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        assert!(timeout_secs > 0, "timeout must be positive");
        self.timeout_secs = timeout_secs;
        self
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            Error::missing_configuration(key, "set it in the environment or a .env file")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_detects_provider() {
        let config = LlmConfig::new("deepseek-chat", "sk-x", "https://api.deepseek.com/v1");
        assert_eq!(config.provider, Provider::DeepSeek);
        assert_eq!(config.timeout_secs, LLM_TIMEOUT_SECS_DEFAULT);
    }

    #[test]
    fn test_with_overrides() {
        let config = LlmConfig::new("m", "k", "https://example.com/v1")
            .with_provider(Provider::Ollama)
            .with_timeout_secs(5);
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.timeout_secs, 5);
    }
}
