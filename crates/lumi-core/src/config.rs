//! Lumi configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LumiError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LumiConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

impl LumiConfig {
    /// Load config from `$LUMI_CONFIG` or ~/.lumi/config.toml, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific path. No environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LumiError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LumiError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Overlay values from the process environment (or any lookup).
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a configured secret.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            if self.llm.api_key.is_empty() {
                self.llm.api_key = key.clone();
            }
            if self.embedding.api_key.is_empty() {
                self.embedding.api_key = key;
            }
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(token) = get("WH_TOKEN") {
            self.whatsapp.verify_token = token;
        }
        if let Some(token) = get("WHATSAPP_API_TOKEN") {
            self.whatsapp.access_token = token;
        }
        if let Some(id) = get("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = id;
        }
        if let Some(secret) = get("WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = secret;
        }
        if let Some(token) = get("LUMI_ADMIN_TOKEN") {
            self.gateway.admin_token = token;
        }
    }

    /// Reject settings that would make the pipeline misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(LumiError::Config("embedding.dimensions must be > 0".into()));
        }
        if self.retrieval.max_top_k == 0 {
            return Err(LumiError::Config("retrieval.max_top_k must be > 0".into()));
        }
        if self.retrieval.default_top_k > self.retrieval.max_top_k {
            return Err(LumiError::Config(format!(
                "retrieval.default_top_k ({}) exceeds max_top_k ({})",
                self.retrieval.default_top_k, self.retrieval.max_top_k
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(LumiError::Config(format!(
                "llm.temperature {} out of range 0..=2",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        match std::env::var("LUMI_CONFIG") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => Self::home_dir().join("config.toml"),
        }
    }

    /// Get the Lumi home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lumi")
    }
}

/// Chat-completion model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Registry name: openai, groq, deepseek, openrouter, ollama, llamacpp.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Overrides the registry base URL.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "openai".into() }
fn default_chat_model() -> String { "gpt-3.5-turbo".into() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 500 }
fn default_model_timeout() -> u64 { 30 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String { "text-embedding-ada-002".into() }
fn default_dimensions() -> usize { 1536 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_model_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

fn default_top_k() -> usize { 3 }
fn default_max_top_k() -> usize { 20 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Empty disables the admin guard.
    #[serde(default)]
    pub admin_token: String,
    /// Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. `~` is expanded by the binary.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.lumi/lumi.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    /// Webhook verification secret. Empty makes verification fail with 500.
    #[serde(default)]
    pub verify_token: String,
    /// When set, POST bodies must carry a valid `X-Hub-Signature-256`.
    #[serde(default)]
    pub app_secret: String,
    /// Tenant that owns webhook conversations.
    #[serde(default = "default_webhook_tenant")]
    pub tenant_id: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_tenant() -> String { "default".into() }
fn default_api_version() -> String { "v17.0".into() }
fn default_delivery_timeout() -> u64 { 10 }

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
            app_secret: String::new(),
            tenant_id: default_webhook_tenant(),
            api_version: default_api_version(),
            timeout_secs: default_delivery_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LumiConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert!((config.llm.temperature - 0.7).abs() < 0.01);
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.retrieval.default_top_k, 3);
        assert_eq!(config.retrieval.max_top_k, 20);
        assert_eq!(config.whatsapp.api_version, "v17.0");
        assert_eq!(config.whatsapp.timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [llm]
            provider = "groq"
            model = "llama-3.1-8b-instant"
            temperature = 0.2

            [retrieval]
            default_top_k = 5

            [whatsapp]
            verify_token = "secret"
            tenant_id = "acme"
        "#;

        let config: LumiConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.max_top_k, 20);
        assert_eq!(config.whatsapp.verify_token, "secret");
        assert_eq!(config.whatsapp.tenant_id, "acme");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: LumiConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.database.path, "~/.lumi/lumi.db");
        assert_eq!(config.whatsapp.tenant_id, "default");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("WH_TOKEN", "verify-me"),
            ("DATABASE_PATH", "/tmp/lumi.db"),
            ("LUMI_ADMIN_TOKEN", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = LumiConfig::default();
        config.embedding.api_key = "sk-embed".into();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key, "sk-test");
        // Explicit key in the file wins.
        assert_eq!(config.embedding.api_key, "sk-embed");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.whatsapp.verify_token, "verify-me");
        assert_eq!(config.database.path, "/tmp/lumi.db");
        assert!(config.gateway.admin_token.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_top_k() {
        let mut config = LumiConfig::default();
        config.retrieval.default_top_k = 50;
        assert!(config.validate().is_err());
        config.retrieval.default_top_k = 3;
        config.retrieval.max_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("lumi-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[gateway]\nport = 9100\n").unwrap();
        let loaded = LumiConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 9100);
        assert_eq!(loaded.retrieval.max_top_k, 20);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_home_dir() {
        let home = LumiConfig::home_dir();
        assert!(home.to_string_lossy().contains("lumi"));
    }
}
