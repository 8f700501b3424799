use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::context::{ContextLimits, DEFAULT_SYSTEM_PROMPT, MIN_REPLY_TOKENS};
use crate::error::ConfigError;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AstralConfig {
    pub gateway: GatewayConfig,
    pub completion: CompletionConfig,
    pub search: SearchConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Browser origins allowed to call the API. `"*"` allows any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_bind() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Overrides the provider's default API base URL.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_context_tokens: u32,
    pub web_reply_tokens: u32,
    pub default_reply_tokens: u32,
    pub max_user_chars: usize,
    pub max_excerpt_chars: usize,
    pub timeout_secs: u64,
    pub assistant_name: String,
    pub system_prompt: Option<String>,
    pub system_prompt_path: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let limits = ContextLimits::default();
        Self {
            provider: "groq".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            top_p: 0.9,
            max_context_tokens: limits.max_context_tokens,
            web_reply_tokens: limits.web_reply_tokens,
            default_reply_tokens: limits.default_reply_tokens,
            max_user_chars: limits.max_user_chars,
            max_excerpt_chars: limits.max_excerpt_chars,
            timeout_secs: 60,
            assistant_name: "Astral".into(),
            system_prompt: None,
            system_prompt_path: None,
        }
    }
}

impl CompletionConfig {
    pub fn limits(&self) -> ContextLimits {
        ContextLimits {
            max_context_tokens: self.max_context_tokens,
            web_reply_tokens: self.web_reply_tokens,
            default_reply_tokens: self.default_reply_tokens,
            max_excerpt_chars: self.max_excerpt_chars,
            max_user_chars: self.max_user_chars,
        }
    }

    /// Env var consulted for this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GROQ_API_KEY",
        }
    }

    /// The completion credential, or the startup error when it is missing.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: self.provider.clone(),
                env_var: self.api_key_env(),
            })
    }

    /// System instructions: file, then inline text, then the built-in prompt.
    ///
    /// An unreadable file is logged and skipped rather than failing startup.
    pub fn system_instructions(&self) -> String {
        if let Some(path) = self.system_prompt_path.as_deref() {
            match std::fs::read_to_string(path) {
                Ok(content) if !content.trim().is_empty() => {
                    info!(path, "loaded system prompt");
                    return content;
                }
                Ok(_) => warn!(path, "system prompt file is empty, ignoring"),
                Err(e) => warn!(path, "failed to read system prompt: {e}"),
            }
        }
        match self.system_prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt.to_string(),
            _ => DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Enables Bing as the first provider.
    pub bing_api_key: Option<String>,
    pub max_results: usize,
    /// Extra encyclopedia hits appended after the web results.
    pub encyclopedia_results: usize,
    pub cache_capacity: usize,
    /// 0 disables expiry.
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
    pub encyclopedia_timeout_secs: u64,
    /// Run web search on every message; the heuristic then only gates
    /// whether results reach the prompt.
    pub always_fetch_web_results: bool,
    /// Empty disables the probe (always assume online).
    pub probe_url: String,
    pub probe_timeout_secs: u64,
    pub max_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bing_api_key: None,
            max_results: 4,
            encyclopedia_results: 2,
            cache_capacity: crate::search::cache::DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: 900,
            timeout_secs: 12,
            encyclopedia_timeout_secs: 10,
            always_fetch_web_results: false,
            probe_url: "https://www.wikipedia.org".into(),
            probe_timeout_secs: 5,
            max_query_chars: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub retrieve_limit: usize,
    /// JSON file mirroring the log. Unset keeps memory in-process only.
    pub path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: crate::memory::DEFAULT_CAPACITY,
            retrieve_limit: 5,
            path: None,
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `ASTRAL_CONFIG` env var
/// 2. `~/.astral/config.toml`
/// 3. Zero-config defaults (no file needed)
///
/// Credentials and `PORT` are then filled in from the environment.
pub fn load() -> Result<AstralConfig, ConfigError> {
    let path = config_path();

    let mut config = if path.exists() {
        let config = load_from_path(&path)?;
        info!("loaded config from {}", path.display());
        config
    } else {
        info!("no config file found, using zero-config defaults");
        AstralConfig::default()
    };

    apply_env(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Parse a config file without consulting the environment.
pub fn load_from_path(path: &Path) -> Result<AstralConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ASTRAL_CONFIG") {
        return PathBuf::from(path);
    }
    crate::secrets::state_dir().join("config.toml")
}

/// Fill credentials and port from the environment when the file leaves them unset.
fn apply_env(config: &mut AstralConfig) {
    if config.completion.api_key.is_none() {
        config.completion.api_key = std::env::var(config.completion.api_key_env())
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| crate::secrets::load_api_key(&config.completion.provider));
    }

    if config.search.bing_api_key.is_none() {
        config.search.bing_api_key = std::env::var("BING_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| crate::secrets::load_api_key("bing"));
    }

    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }
}

/// Validate the config and return clear error messages.
pub fn validate(config: &AstralConfig) -> Result<(), ConfigError> {
    let valid_providers = ["groq", "openai"];
    if !valid_providers.contains(&config.completion.provider.as_str()) {
        return Err(ConfigError::Invalid(format!(
            "invalid provider '{}': must be one of {:?}",
            config.completion.provider, valid_providers
        )));
    }

    let c = &config.completion;
    if !(0.0..=2.0).contains(&c.temperature) {
        return Err(ConfigError::Invalid(
            "completion.temperature must be within 0.0..=2.0".into(),
        ));
    }
    if !(c.top_p > 0.0 && c.top_p <= 1.0) {
        return Err(ConfigError::Invalid(
            "completion.top_p must be within (0.0, 1.0]".into(),
        ));
    }
    if c.max_context_tokens <= MIN_REPLY_TOKENS {
        return Err(ConfigError::Invalid(format!(
            "completion.max_context_tokens must be > {MIN_REPLY_TOKENS}"
        )));
    }
    if c.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "completion.timeout_secs must be > 0".into(),
        ));
    }

    if config.memory.capacity == 0 {
        return Err(ConfigError::Invalid("memory.capacity must be > 0".into()));
    }
    if config.search.cache_capacity == 0 {
        return Err(ConfigError::Invalid(
            "search.cache_capacity must be > 0".into(),
        ));
    }
    if config.search.timeout_secs == 0 || config.search.encyclopedia_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "search timeouts must be > 0".into(),
        ));
    }

    Ok(())
}
