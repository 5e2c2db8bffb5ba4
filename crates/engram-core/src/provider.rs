//! LLM provider selection
//!
//! TigerStyle: Provider detection is a pure function over the caller's
//! options and an environment snapshot, so it can be tested by enumeration.
//!
//! Priority chain: explicit argument, provider-specific env key, base-URL
//! pattern, API-key prefix, default.

use serde::{Deserialize, Serialize};

/// Known OpenAI-compatible providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// api.openai.com
    OpenAi,
    /// api.deepseek.com
    DeepSeek,
    /// dashscope.aliyuncs.com (compatible mode)
    DashScope,
    /// api.moonshot.cn
    Moonshot,
    /// open.bigmodel.cn
    Zhipu,
    /// Local Ollama endpoint
    Ollama,
}

impl Provider {
    /// Wire name of the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::DashScope => "dashscope",
            Provider::Moonshot => "moonshot",
            Provider::Zhipu => "zhipu",
            Provider::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the provider-specific environment keys
///
/// Captured once so detection stays deterministic and testable.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub dashscope_api_key: Option<String>,
    pub moonshot_api_key: Option<String>,
    pub zhipu_api_key: Option<String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            dashscope_api_key: std::env::var("DASHSCOPE_API_KEY").ok(),
            moonshot_api_key: std::env::var("MOONSHOT_API_KEY").ok(),
            zhipu_api_key: std::env::var("ZHIPU_API_KEY").ok(),
        }
    }

    /// Empty snapshot (no keys set), for tests
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Detect the provider from the caller's options and the environment
///
/// The chain is evaluated in order; the first match wins.
pub fn detect_provider(
    explicit: Option<Provider>,
    base_url: Option<&str>,
    api_key: Option<&str>,
    env: &EnvSnapshot,
) -> Provider {
    // 1. Explicit argument
    if let Some(provider) = explicit {
        return provider;
    }

    // 2. Provider-specific env key
    if env.openai_api_key.is_some() {
        return Provider::OpenAi;
    }
    if env.deepseek_api_key.is_some() {
        return Provider::DeepSeek;
    }
    if env.dashscope_api_key.is_some() {
        return Provider::DashScope;
    }
    if env.moonshot_api_key.is_some() {
        return Provider::Moonshot;
    }
    if env.zhipu_api_key.is_some() {
        return Provider::Zhipu;
    }

    // 3. Base-URL pattern
    if let Some(url) = base_url {
        if url.contains("openai.com") {
            return Provider::OpenAi;
        }
        if url.contains("deepseek.com") {
            return Provider::DeepSeek;
        }
        if url.contains("dashscope.aliyuncs.com") {
            return Provider::DashScope;
        }
        if url.contains("moonshot.cn") {
            return Provider::Moonshot;
        }
        if url.contains("bigmodel.cn") {
            return Provider::Zhipu;
        }
        if url.contains(":11434") {
            return Provider::Ollama;
        }
    }

    // 4. API-key prefix
    if let Some(key) = api_key {
        // Zhipu keys are "<id>.<secret>"; the others share the "sk-" prefix.
        if key.contains('.') && !key.starts_with("sk-") {
            return Provider::Zhipu;
        }
    }

    // 5. Default
    Provider::OpenAi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let env = EnvSnapshot {
            openai_api_key: Some("sk-x".into()),
            ..EnvSnapshot::empty()
        };
        let provider = detect_provider(Some(Provider::DeepSeek), None, None, &env);
        assert_eq!(provider, Provider::DeepSeek);
    }

    #[test]
    fn test_env_key_priority() {
        let env = EnvSnapshot {
            deepseek_api_key: Some("sk-x".into()),
            dashscope_api_key: Some("sk-y".into()),
            ..EnvSnapshot::empty()
        };
        assert_eq!(detect_provider(None, None, None, &env), Provider::DeepSeek);
    }

    #[test]
    fn test_url_pattern() {
        let env = EnvSnapshot::empty();
        assert_eq!(
            detect_provider(None, Some("https://api.deepseek.com/v1"), None, &env),
            Provider::DeepSeek
        );
        assert_eq!(
            detect_provider(
                None,
                Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
                None,
                &env
            ),
            Provider::DashScope
        );
        assert_eq!(
            detect_provider(None, Some("http://localhost:11434/v1"), None, &env),
            Provider::Ollama
        );
    }

    #[test]
    fn test_key_prefix() {
        let env = EnvSnapshot::empty();
        assert_eq!(
            detect_provider(None, None, Some("abc123.def456"), &env),
            Provider::Zhipu
        );
        assert_eq!(
            detect_provider(None, None, Some("sk-abc123"), &env),
            Provider::OpenAi
        );
    }

    #[test]
    fn test_default() {
        assert_eq!(
            detect_provider(None, None, None, &EnvSnapshot::empty()),
            Provider::OpenAi
        );
    }
}
