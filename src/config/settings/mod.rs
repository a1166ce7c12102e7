
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::index::Metric;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub hosted: HostedConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which embedding endpoint the index manager talks to
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// A local Ollama server
    #[default]
    Ollama,
    /// An OpenAI-compatible hosted API authenticated with a bearer key
    Hosted,
}

impl fmt::Display for EmbeddingProvider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::Hosted => f.write_str("hosted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostedConfig {
    /// Base URL of the OpenAI-compatible API, without the `/embeddings` suffix
    pub base_url: String,
    pub model: String,
    pub batch_size: u32,
    /// Name of the environment variable the CLI reads the API key from
    pub api_key_env: String,
    /// Optional `input_type` field some hosted embedders require ("passage"/"query")
    pub input_type: Option<String>,
}

impl Default for HostedConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: "nvidia/nv-embedqa-e5-v5".to_string(),
            batch_size: 32,
            api_key_env: "EMBED_INDEX_API_KEY".to_string(),
            input_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Index directory used when a command does not name one
    pub path: Option<PathBuf>,
    pub metric: Metric,
    pub default_k: usize,
    pub embedding_timeout_seconds: u64,
    pub storage_timeout_seconds: u64,
    /// How many documents may be embedded concurrently during one ingest
    pub concurrency: usize,
}

impl Default for IndexConfig {
    #[inline]
    fn default() -> Self {
        Self {
            path: None,
            metric: Metric::Cosine,
            default_k: 4,
            embedding_timeout_seconds: 120,
            storage_timeout_seconds: 30,
            concurrency: 2,
        }
    }
}

impl IndexConfig {
    #[inline]
    pub const fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_seconds)
    }

    #[inline]
    pub const fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for FetchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: concat!("embed-index/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid max chunk size: {0} (must be greater than 0)")]
    InvalidMaxChunkSize(usize),
    #[error("Invalid overlap size: {overlap} (must be less than max chunk size {max_size})")]
    InvalidOverlapSize { overlap: usize, max_size: usize },
    #[error("Invalid default k: {0} (must be at least 1)")]
    InvalidDefaultK(usize),
    #[error("Invalid timeout: {0} seconds (must be between 1 and 3600)")]
    InvalidTimeout(u64),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid API key environment variable name: {0:?}")]
    InvalidApiKeyEnv(String),
    #[error("The hosted embedding provider requires an API key")]
    MissingApiKey,
    #[error("Unknown distance metric: {0} (expected 'cosine' or 'euclidean')")]
    UnknownMetric(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            ollama: OllamaConfig::default(),
            hosted: HostedConfig::default(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            fetch: FetchConfig::default(),
            base_dir: Self::config_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".embed-index"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("embed-index"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the configuration from the default directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to locate config directory")?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.hosted.validate()?;
        self.chunking.validate()?;
        self.validate_index_config()?;
        self.validate_fetch_config()?;
        Ok(())
    }

    fn validate_index_config(&self) -> Result<(), ConfigError> {
        let config = &self.index;

        if config.default_k == 0 {
            return Err(ConfigError::InvalidDefaultK(config.default_k));
        }

        for timeout in [
            config.embedding_timeout_seconds,
            config.storage_timeout_seconds,
        ] {
            if !(1..=3600).contains(&timeout) {
                return Err(ConfigError::InvalidTimeout(timeout));
            }
        }

        if !(1..=64).contains(&config.concurrency) {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }

        Ok(())
    }

    fn validate_fetch_config(&self) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.fetch.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.fetch.timeout_seconds));
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Index directory used when no explicit path is given.
    ///
    /// Relative paths in the config file resolve against the base directory.
    #[inline]
    pub fn default_index_path(&self) -> PathBuf {
        match &self.index.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.get_base_dir().join(path),
            None => self.get_base_dir().join("indexes").join("default"),
        }
    }

    /// Model name of the configured provider
    #[inline]
    pub fn embedding_model(&self) -> &str {
        match self.provider {
            EmbeddingProvider::Ollama => &self.ollama.model,
            EmbeddingProvider::Hosted => &self.hosted.model,
        }
    }
}

fn validate_batch_size(batch_size: u32) -> Result<(), ConfigError> {
    if batch_size == 0 || batch_size > 1000 {
        return Err(ConfigError::InvalidBatchSize(batch_size));
    }
    Ok(())
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        validate_batch_size(self.batch_size)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = Self {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        validate_batch_size(batch_size)?;
        self.batch_size = batch_size;
        Ok(())
    }
}

impl HostedConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embeddings_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        validate_batch_size(self.batch_size)?;

        if self.api_key_env.trim().is_empty() || self.api_key_env.contains('=') {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        Ok(())
    }

    /// Full URL of the `/embeddings` endpoint
    #[inline]
    pub fn embeddings_url(&self) -> Result<Url, ConfigError> {
        let base = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(base.scheme().to_string()));
        }

        // Url::join drops the last path segment unless the base ends with a slash
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("embeddings")
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = Self {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.embeddings_url()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        validate_batch_size(batch_size)?;
        self.batch_size = batch_size;
        Ok(())
    }
}
