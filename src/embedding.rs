//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations for the network backends:
//!
//! | Provider | Endpoint | Auth |
//! |----------|----------|------|
//! | `bedrock` | `POST /model/{model}/invoke` on the Bedrock runtime | SigV4 (`bedrock`) |
//! | `openai` | `POST /v1/embeddings` | `OPENAI_API_KEY` bearer token |
//! | `ollama` | `POST /api/embed` | none |
//! | `disabled` | none | none |
//!
//! Each provider holds one `reqwest::Client` with the configured timeout.
//! A failed call is reported once and never retried; the store decides how
//! to degrade.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde_json::{json, Value};
use tracing::warn;

use governance_rules_core::embedding::{DisabledEmbedder, Embedder, EmbeddingError};

use crate::aws::{uri_encode, SigV4Signer};
use crate::config::Config;

/// Titan text embeddings, 1536 dimensions.
pub const DEFAULT_BEDROCK_MODEL: &str = "amazon.titan-embed-text-v1";

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build embedding HTTP client")
}

fn request_error(e: reqwest::Error) -> EmbeddingError {
    EmbeddingError::Request(e.to_string())
}

async fn read_json(resp: reqwest::Response, provider: &str) -> Result<Value, EmbeddingError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(EmbeddingError::Request(format!(
            "{} API error {}: {}",
            provider,
            status,
            body.chars().take(500).collect::<String>()
        )));
    }
    resp.json()
        .await
        .map_err(|e| EmbeddingError::Response(e.to_string()))
}

fn parse_vector(value: Option<&Value>, what: &str) -> Result<Vec<f32>, EmbeddingError> {
    let array = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| EmbeddingError::Response(format!("missing {}", what)))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::Response(format!("non-numeric value in {}", what)))
        })
        .collect()
}

// ============ Bedrock ============

/// Amazon Bedrock runtime (Titan text embeddings).
pub struct BedrockEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base: String,
    signer: Option<SigV4Signer>,
}

impl BedrockEmbedder {
    pub fn new(
        model: impl Into<String>,
        dims: usize,
        base: impl Into<String>,
        timeout_secs: u64,
        signer: Option<SigV4Signer>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            model: model.into(),
            dims,
            base: base.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let region = &config.index.region;
        let model = config
            .embedding
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_BEDROCK_MODEL.to_string());
        let base = config
            .embedding
            .url
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region));

        let signer = SigV4Signer::from_env(region, "bedrock");
        if signer.is_none() {
            warn!("no AWS credentials in environment, Bedrock requests will be unsigned");
        }

        Self::new(
            model,
            embedding_dims(config),
            base,
            config.embedding.timeout_secs,
            signer,
        )
    }
}

#[async_trait]
impl Embedder for BedrockEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = Url::parse(&format!(
            "{}/model/{}/invoke",
            self.base,
            uri_encode(&self.model)
        ))
        .map_err(|e| EmbeddingError::Request(format!("invalid Bedrock URL: {}", e)))?;
        let body = serde_json::to_vec(&json!({ "inputText": text }))
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let mut req = self
            .client
            .post(url.clone())
            .header("content-type", "application/json")
            .header("accept", "application/json");
        if let Some(ref signer) = self.signer {
            for (name, value) in signer.sign("POST", &url, &body, Utc::now()) {
                req = req.header(name, value);
            }
        }

        let resp = req.body(body).send().await.map_err(request_error)?;
        let json = read_json(resp, "Bedrock").await?;
        parse_vector(json.get("embedding"), "embedding")
    }
}

// ============ OpenAI ============

/// OpenAI (or any OpenAI-compatible) embeddings endpoint.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base: String,
    api_key: String,
}

impl OpenAIEmbedder {
    pub fn new(
        model: impl Into<String>,
        dims: usize,
        base: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            model: model.into(),
            dims,
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        let model = config
            .embedding
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let base = config
            .embedding
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Self::new(
            model,
            embedding_dims(config),
            base,
            api_key,
            config.embedding.timeout_secs,
        )
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({ "model": self.model, "input": [text] }))
            .send()
            .await
            .map_err(request_error)?;

        let json = read_json(resp, "OpenAI").await?;
        let first = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .ok_or_else(|| EmbeddingError::Response("missing data array".into()))?;
        parse_vector(first.get("embedding"), "embedding")
    }
}

// ============ Ollama ============

/// A local Ollama instance.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base: String,
}

impl OllamaEmbedder {
    pub fn new(
        model: impl Into<String>,
        dims: usize,
        base: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            model: model.into(),
            dims,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let model = config
            .embedding
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let base = config
            .embedding
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self::new(model, embedding_dims(config), base, config.embedding.timeout_secs)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base))
            .json(&json!({ "model": self.model, "input": [text] }))
            .send()
            .await
            .map_err(|e| {
                EmbeddingError::Request(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.base, e
                ))
            })?;

        let json = read_json(resp, "Ollama").await?;
        let first = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first());
        parse_vector(first, "embeddings[0]")
    }
}

// ============ Factory ============

fn embedding_dims(config: &Config) -> usize {
    config.embedding.dims.unwrap_or(config.index.dims)
}

/// Build the embedder named by `[embedding].provider`.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedding.provider.as_str() {
        "disabled" => Arc::new(DisabledEmbedder::new(embedding_dims(config))),
        "bedrock" => Arc::new(BedrockEmbedder::from_config(config)?),
        "openai" => Arc::new(OpenAIEmbedder::from_config(config)?),
        "ollama" => Arc::new(OllamaEmbedder::from_config(config)?),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        let v = json!({ "embedding": [0.5, -1.0, 2] });
        assert_eq!(
            parse_vector(v.get("embedding"), "embedding").unwrap(),
            vec![0.5, -1.0, 2.0]
        );
        assert!(matches!(
            parse_vector(v.get("missing"), "embedding"),
            Err(EmbeddingError::Response(_))
        ));
        let bad = json!(["x"]);
        assert!(parse_vector(Some(&bad), "embedding").is_err());
    }

    #[test]
    fn test_create_disabled_uses_index_dims() {
        let mut config = Config::default();
        config.embedding.provider = "disabled".into();
        config.index.dims = 16;
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dims(), 16);
        assert_eq!(embedder.model_name(), "disabled");
    }

    #[test]
    fn test_bedrock_defaults() {
        let mut config = Config::default();
        config.index.region = "eu-west-1".into();
        let embedder = BedrockEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), DEFAULT_BEDROCK_MODEL);
        assert_eq!(embedder.dims(), 1536);
        assert_eq!(
            embedder.base,
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_ollama_requires_model() {
        let mut config = Config::default();
        config.embedding.provider = "ollama".into();
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = Config::default();
        config.embedding.provider = "magic".into();
        assert!(create_embedder(&config).is_err());
    }
}
