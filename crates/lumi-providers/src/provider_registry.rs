//! Static registry of OpenAI-compatible providers.
//!
//! Every entry speaks the same wire format; they differ only in base URL,
//! auth style and where the API key comes from.

/// How to send auth credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// No authentication (local servers).
    None,
}

/// Configuration for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Appended to `base_url` for chat completions.
    pub chat_path: &'static str,
    /// Appended to `base_url` for embeddings. `None` if unsupported.
    pub embeddings_path: Option<&'static str>,
    /// Environment variables tried in order for the API key.
    pub env_keys: &'static [&'static str],
    pub auth_style: AuthStyle,
    /// Environment variable overriding the base URL (e.g. OLLAMA_HOST).
    pub base_url_env: Option<&'static str>,
}

// ─── Registry ────────────────────────────────────────────────────────────────

static PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        chat_path: "/chat/completions",
        embeddings_path: Some("/embeddings"),
        env_keys: &["OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("OPENAI_API_BASE"),
    },
    ProviderConfig {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        chat_path: "/chat/completions",
        embeddings_path: None,
        env_keys: &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
    },
    ProviderConfig {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        chat_path: "/chat/completions",
        embeddings_path: None,
        env_keys: &["DEEPSEEK_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
    },
    ProviderConfig {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        chat_path: "/chat/completions",
        embeddings_path: None,
        env_keys: &["GROQ_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
    },
    ProviderConfig {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        chat_path: "/chat/completions",
        embeddings_path: Some("/embeddings"),
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("OLLAMA_HOST"),
    },
    ProviderConfig {
        name: "llamacpp",
        base_url: "http://localhost:8080/v1",
        chat_path: "/chat/completions",
        embeddings_path: Some("/embeddings"),
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("LLAMACPP_HOST"),
    },
];

/// Look up a provider config by name.
pub fn get_provider_config(name: &str) -> Option<&'static ProviderConfig> {
    let lookup = match name {
        "llama.cpp" => "llamacpp",
        other => other,
    };
    PROVIDERS.iter().find(|p| p.name == lookup)
}

/// Resolve an API key: explicit value > registry env vars > empty.
pub(crate) fn resolve_api_key(registry: &ProviderConfig, explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    registry
        .env_keys
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_default()
}

/// Resolve a base URL: explicit endpoint > env override > registry default.
pub(crate) fn resolve_base_url(registry: &ProviderConfig, explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.trim_end_matches('/').to_string();
    }
    registry
        .base_url_env
        .and_then(|env_key| {
            let val = std::env::var(env_key).ok().filter(|v| !v.is_empty())?;
            // OLLAMA_HOST / LLAMACPP_HOST usually omit the /v1 suffix
            if val.ends_with("/v1") {
                Some(val)
            } else {
                Some(format!("{}/v1", val.trim_end_matches('/')))
            }
        })
        .unwrap_or_else(|| registry.base_url.to_string())
}
