//! Configuration parsing and validation.
//!
//! Configuration is read from a TOML file (default `rules.toml`). A missing
//! file yields the defaults below. After parsing, a handful of environment
//! variables override file values so the same binary can be pointed at a
//! different cluster without editing the file.
//!
//! # Example
//!
//! ```toml
//! [index]
//! backend = "opensearch"
//! endpoint = "https://search-governance.us-east-1.es.amazonaws.com"
//! name = "governance-rules"
//! region = "us-east-1"
//! dims = 1536
//!
//! [embedding]
//! provider = "bedrock"
//! model = "amazon.titan-embed-text-v1"
//!
//! [store]
//! preserve_created_at = true
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `OPENSEARCH_ENDPOINT` | `index.endpoint` |
//! | `INDEX_NAME` | `index.name` |
//! | `AWS_REGION`, then `AWS_DEFAULT_REGION` | `index.region` |
//! | `RULES_BIND` | `server.bind` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use governance_rules_core::embedding::DEFAULT_DIMS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `opensearch` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: None,
            name: default_index_name(),
            region: default_region(),
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> String {
    "opensearch".to_string()
}
fn default_index_name() -> String {
    "governance-rules".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `bedrock`, `openai`, `ollama`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Defaults to `index.dims`.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway, Ollama host, Bedrock
    /// runtime endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "bedrock".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub preserve_created_at: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            preserve_created_at: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Read, override from the environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides using `lookup` as the variable source.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(endpoint) = non_empty("OPENSEARCH_ENDPOINT") {
        config.index.endpoint = Some(endpoint);
    }
    if let Some(name) = non_empty("INDEX_NAME") {
        config.index.name = name;
    }
    if let Some(region) = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")) {
        config.index.region = region;
    }
    if let Some(bind) = non_empty("RULES_BIND") {
        config.server.bind = bind;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    match config.index.backend.as_str() {
        "opensearch" => {
            if config.index.endpoint.is_none() {
                bail!("index.endpoint (or OPENSEARCH_ENDPOINT) is required for the opensearch backend");
            }
        }
        "memory" => {}
        other => bail!(
            "Unknown index backend: '{}'. Must be opensearch or memory.",
            other
        ),
    }

    if config.index.name.trim().is_empty() {
        bail!("index.name must not be empty");
    }
    if config.index.dims == 0 {
        bail!("index.dims must be > 0");
    }
    if config.index.timeout_secs == 0 || config.embedding.timeout_secs == 0 {
        bail!("timeout_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "bedrock" | "openai" | "ollama" | "disabled" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be bedrock, openai, ollama, or disabled.",
            other
        ),
    }

    if let Some(dims) = config.embedding.dims {
        if dims != config.index.dims {
            bail!(
                "embedding.dims ({}) must match index.dims ({})",
                dims,
                config.index.dims
            );
        }
    }

    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(())
}
