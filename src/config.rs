//! Configuration loading and management for recap.
//!
//! Loads settings from `recap.toml` with environment variable overrides for sensitive data.
//! Every section has defaults, so a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider: "groq" or "openai"
    pub provider: String,
    /// Model identifier (e.g., "llama3-8b-8192")
    pub model: String,
    /// Base URL of an OpenAI-compatible API; derived from the provider when unset
    pub base_url: Option<String>,
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// System prompt; `{context}` is replaced by the text to summarise
    pub prompt: String,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub groq_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Text splitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk
    pub overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

/// Reduction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    /// Number of summaries combined per LLM call
    pub batch_size: usize,
    /// Maximum summarizer calls in flight at once
    pub concurrency: usize,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub reduce: ReduceConfig,
}

pub const DEFAULT_PROMPT: &str = "Write a concise summary of the following:\n\n{context}";

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama3-8b-8192".to_string(),
            base_url: None,
            temperature: 0.0,
            timeout_secs: 120,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
            min_chunk_size: 300,
            max_chunk_size: 3000,
        }
    }
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            concurrency: 1,
        }
    }
}

impl Config {
    /// Load configuration from the default location (recap.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse and validate a TOML document without touching the environment
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.api.groq_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("recap.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::home_dir()
            .map(|home| home.join(".config").join("recap").join("recap.toml"))
            .filter(|path| path.exists())
    }

    /// Check the numeric settings for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chunking;
        if c.min_chunk_size == 0 || c.min_chunk_size > c.max_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk size range {}..={} is empty",
                c.min_chunk_size, c.max_chunk_size
            )));
        }
        self.check_chunk_size(c.chunk_size)?;
        if self.reduce.batch_size < 2 {
            return Err(ConfigError::Invalid(
                "reduce.batch_size must be at least 2".to_string(),
            ));
        }
        if self.reduce.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "reduce.concurrency must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        if !self.llm.prompt.contains("{context}") {
            return Err(ConfigError::Invalid(
                "llm.prompt must contain a {context} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    /// Check a chunk size against the configured range
    pub fn check_chunk_size(&self, chunk_size: usize) -> Result<(), ConfigError> {
        let c = &self.chunking;
        if chunk_size < c.min_chunk_size || chunk_size > c.max_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk size {} is outside {}..={}",
                chunk_size, c.min_chunk_size, c.max_chunk_size
            )));
        }
        if c.overlap >= chunk_size {
            return Err(ConfigError::Invalid(format!(
                "overlap {} must be smaller than chunk size {}",
                c.overlap, chunk_size
            )));
        }
        Ok(())
    }

    /// Get the API key for the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        match self.llm.provider.as_str() {
            "groq" => self
                .api
                .groq_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingApiKey("groq".to_string())),
            "openai" => self
                .api
                .openai_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingApiKey("openai".to_string())),
            other => Err(ConfigError::MissingApiKey(other.to_string())),
        }
    }

    /// Store a key for the configured provider (used after an interactive prompt)
    pub fn set_api_key(&mut self, key: String) {
        match self.llm.provider.as_str() {
            "openai" => self.api.openai_key = Some(key),
            _ => self.api.groq_key = Some(key),
        }
    }

    /// Base URL for the chat-completions API
    pub fn base_url(&self) -> &str {
        if let Some(url) = self.llm.base_url.as_deref() {
            return url;
        }
        match self.llm.provider.as_str() {
            "openai" => "https://api.openai.com/v1",
            _ => "https://api.groq.com/openai/v1",
        }
    }
}
