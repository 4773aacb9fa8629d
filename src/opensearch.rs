//! OpenSearch implementation of [`SearchIndex`].
//!
//! Talks to the OpenSearch REST API over `reqwest`, signing each request
//! with SigV4 (service `es`) when AWS credentials are available. The k-NN
//! plugin provides the `knn_vector` field type and the `knn` query.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | ping | `GET /_cluster/health` |
//! | exists | `HEAD /{index}` |
//! | create | `PUT /{index}` |
//! | put | `PUT /{index}/_doc/{id}` |
//! | get | `GET /{index}/_doc/{id}` |
//! | knn_search, match_all | `POST /{index}/_search` |
//!
//! With the cluster default `action.auto_create_index = true` a write to a
//! missing index creates it with dynamic mappings, so the store makes sure
//! the index exists before its first write.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use governance_rules_core::index::{
    Hit, IndexError, IndexSchema, KnnRequest, MatchAllRequest, SearchHits, SearchIndex,
};
use governance_rules_core::models::{RuleDocument, RuleRecord};

use crate::aws::{uri_encode, SigV4Signer};

/// Longest backend error body echoed into an error message.
const MAX_ERROR_BODY: usize = 500;

pub struct OpenSearchIndex {
    client: reqwest::Client,
    base: String,
    name: String,
    signer: Option<SigV4Signer>,
}

impl OpenSearchIndex {
    /// `endpoint` may omit the scheme, in which case HTTPS is assumed.
    pub fn new(
        endpoint: &str,
        name: impl Into<String>,
        timeout: Duration,
        signer: Option<SigV4Signer>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenSearch HTTP client")?;

        let base = normalize_endpoint(endpoint);
        Url::parse(&base).with_context(|| format!("Invalid OpenSearch endpoint: {}", endpoint))?;

        Ok(Self {
            client,
            base,
            name: name.into(),
            signer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    fn index_path(&self) -> String {
        uri_encode(&self.name)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), IndexError> {
        let url = Url::parse(&format!("{}/{}", self.base, path))
            .map_err(|e| IndexError::Backend(format!("invalid request URL: {}", e)))?;
        let payload = match body {
            Some(v) => serde_json::to_vec(v)
                .map_err(|e| IndexError::Backend(format!("failed to encode request: {}", e)))?,
            None => Vec::new(),
        };

        let mut req = self.client.request(method.clone(), url.clone());
        if let Some(ref signer) = self.signer {
            for (name, value) in signer.sign(method.as_str(), &url, &payload, Utc::now()) {
                req = req.header(name, value);
            }
        }
        if body.is_some() {
            req = req.header("content-type", "application/json").body(payload);
        }

        debug!(%method, path, "opensearch request");
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        Ok((status, text))
    }

    fn classify(&self, status: StatusCode, body: &str) -> IndexError {
        if body.contains("index_not_found_exception") || body.contains("no such index") {
            IndexError::NotFound(self.name.clone())
        } else if body.contains("resource_already_exists_exception") {
            IndexError::AlreadyExists(self.name.clone())
        } else {
            IndexError::Backend(format!(
                "OpenSearch returned HTTP {}: {}",
                status,
                body.chars().take(MAX_ERROR_BODY).collect::<String>()
            ))
        }
    }

    async fn search(&self, body: &Value) -> Result<SearchHits, IndexError> {
        let path = format!("{}/_search", self.index_path());
        let (status, text) = self.send(Method::POST, &path, Some(body)).await?;
        if !status.is_success() {
            return Err(self.classify(status, &text));
        }
        parse_search_response(&text)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn transport_error(e: reqwest::Error) -> IndexError {
    if e.is_connect() || e.is_timeout() {
        IndexError::Unreachable(e.to_string())
    } else {
        IndexError::Backend(e.to_string())
    }
}

/// Settings and mappings for a new rule index.
pub fn index_body(schema: &IndexSchema) -> Value {
    json!({
        "settings": {
            "number_of_shards": schema.shards,
            "number_of_replicas": schema.replicas,
            "index": {
                "knn": true,
                "knn.algo_param.ef_search": schema.ef_search
            }
        },
        "mappings": {
            "properties": {
                "rule_id": { "type": "keyword" },
                "title": { "type": "text" },
                "description": { "type": "text" },
                "category": { "type": "keyword" },
                "priority": { "type": "integer" },
                "tags": { "type": "keyword" },
                "rule_text": { "type": "text" },
                "embedding": {
                    "type": "knn_vector",
                    "dimension": schema.dimension,
                    "method": {
                        "name": "hnsw",
                        "space_type": "cosinesimil",
                        "engine": "nmslib"
                    }
                },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" }
            }
        }
    })
}

/// k-NN query with the category filter inside the same bool query.
pub fn knn_query_body(req: &KnnRequest<'_>) -> Value {
    let mut bool_query = json!({
        "must": [
            { "knn": { "embedding": { "vector": req.vector, "k": req.k } } }
        ]
    });
    if let Some(category) = req.category {
        bool_query["filter"] = json!([{ "term": { "category": category } }]);
    }

    json!({
        "size": req.k,
        "query": { "bool": bool_query },
        "_source": { "excludes": ["embedding"] }
    })
}

pub fn match_all_body(req: &MatchAllRequest) -> Value {
    let sort: Vec<Value> = req
        .sort
        .iter()
        .map(|s| {
            let order = if s.descending { "desc" } else { "asc" };
            let mut clause = serde_json::Map::new();
            clause.insert(s.field.as_str().to_string(), json!({ "order": order }));
            Value::Object(clause)
        })
        .collect();

    json!({
        "size": req.size,
        "query": { "match_all": {} },
        "sort": sort,
        "_source": { "excludes": ["embedding"] }
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: RuleRecord,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<RuleRecord>,
}

fn parse_search_response(text: &str) -> Result<SearchHits, IndexError> {
    let resp: SearchResponse = serde_json::from_str(text)
        .map_err(|e| IndexError::Backend(format!("invalid search response: {}", e)))?;

    let hits: Vec<Hit> = resp
        .hits
        .hits
        .into_iter()
        .map(|h| Hit {
            record: h.source,
            score: h.score,
        })
        .collect();

    let total = match resp.hits.total {
        Some(Total::Count(n)) | Some(Total::Object { value: n }) => n,
        None => hits.len() as u64,
    };

    Ok(SearchHits { hits, total })
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), IndexError> {
        let (status, text) = self.send(Method::GET, "_cluster/health", None).await?;
        if !status.is_success() {
            return Err(IndexError::Unreachable(format!(
                "cluster health returned HTTP {}: {}",
                status,
                text.chars().take(MAX_ERROR_BODY).collect::<String>()
            )));
        }
        debug!(health = %text, "opensearch cluster health");
        Ok(())
    }

    async fn exists(&self) -> Result<bool, IndexError> {
        let (status, text) = self.send(Method::HEAD, &self.index_path(), None).await?;
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(self.classify(status, &text))
        }
    }

    async fn create(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let body = index_body(schema);
        let (status, text) = self.send(Method::PUT, &self.index_path(), Some(&body)).await?;
        if !status.is_success() {
            return Err(self.classify(status, &text));
        }
        Ok(())
    }

    async fn put(&self, doc: &RuleDocument) -> Result<(), IndexError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| IndexError::Backend(format!("failed to encode document: {}", e)))?;
        let path = format!("{}/_doc/{}", self.index_path(), uri_encode(doc.id()));
        let (status, text) = self.send(Method::PUT, &path, Some(&body)).await?;
        if !status.is_success() {
            return Err(self.classify(status, &text));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RuleRecord>, IndexError> {
        let path = format!(
            "{}/_doc/{}?_source_excludes=embedding",
            self.index_path(),
            uri_encode(id)
        );
        let (status, text) = self.send(Method::GET, &path, None).await?;
        if status == StatusCode::NOT_FOUND {
            let err = self.classify(status, &text);
            return match err {
                IndexError::NotFound(_) => Err(err),
                _ => Ok(None),
            };
        }
        if !status.is_success() {
            return Err(self.classify(status, &text));
        }

        let resp: GetResponse = serde_json::from_str(&text)
            .map_err(|e| IndexError::Backend(format!("invalid get response: {}", e)))?;
        Ok(if resp.found { resp.source } else { None })
    }

    async fn knn_search(&self, req: &KnnRequest<'_>) -> Result<SearchHits, IndexError> {
        self.search(&knn_query_body(req)).await
    }

    async fn match_all(&self, req: &MatchAllRequest) -> Result<SearchHits, IndexError> {
        self.search(&match_all_body(req)).await
    }
}
