//! The rule store.
//!
//! [`RuleStore`] owns the domain logic on top of two injected collaborators,
//! an [`Embedder`] and a [`SearchIndex`]. It is constructed once per process
//! and shared by reference. Its only state is a flag recording whether the
//! index is known to exist, so concurrent operations never contend in this
//! layer and conflicting upserts of the same id resolve at the backend (last
//! write wins).
//!
//! # Degraded modes
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Backend unreachable at [`connect`](RuleStore::connect) | `Connectivity` error, no store |
//! | Existence check fails at connect | creation is attempted anyway |
//! | Index creation fails at connect | logged, store still usable |
//! | Embedding fails on upsert | zero vector is stored, upsert succeeds |
//! | Embedding fails on query | `Embedding` error |
//! | Index not confirmed before upsert | creation is attempted before the write |
//! | Index missing on upsert | index is created, write retried once |
//! | Index missing on list or query | empty result, `total = 0` |
//!
//! OpenSearch creates a missing index on the first document write, with
//! dynamic mappings that lack the `knn_vector` field. The store therefore
//! never writes until it has confirmed or created the index itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::embedding::{check_dims, zero_vector, Embedder, DEFAULT_DIMS};
use crate::error::{Result, StoreError};
use crate::index::{IndexError, IndexSchema, KnnRequest, MatchAllRequest, SearchIndex, Sort, SortField};
use crate::models::{NewRule, RuleHits, RuleList, RuleQuery, ScoredRule};

/// Store tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Embedding dimensionality; must match the index schema.
    pub dims: usize,
    /// Keep the original `created_at` when a rule is re-upserted.
    pub preserve_created_at: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dims: DEFAULT_DIMS,
            preserve_created_at: true,
        }
    }
}

/// Rule store over an embedder and a search index.
pub struct RuleStore {
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn Embedder>,
    options: StoreOptions,
    /// Set once the index has been seen or created with the rule schema.
    index_ready: AtomicBool,
}

impl RuleStore {
    /// Open the store, making sure the backing index exists.
    ///
    /// Fails only if the backend cannot be reached at all. Every other
    /// problem with the index lifecycle is logged and tolerated: another
    /// process may have created the index, or the next write will.
    pub async fn connect(
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn Embedder>,
        options: StoreOptions,
    ) -> Result<Self> {
        info!(index = index.name(), "checking search backend connectivity");
        index.ping().await.map_err(StoreError::Connectivity)?;

        if embedder.dims() != options.dims {
            warn!(
                model = embedder.model_name(),
                provider_dims = embedder.dims(),
                index_dims = options.dims,
                "embedding provider dimensionality differs from the index schema"
            );
        }

        let store = Self {
            index,
            embedder,
            options,
            index_ready: AtomicBool::new(false),
        };
        store.ensure_index().await;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    /// Schema the store creates its index with.
    pub fn schema(&self) -> IndexSchema {
        IndexSchema::new(self.options.dims)
    }

    /// Create the index unless it is already there. Never fails; returns
    /// whether the index is now known to exist.
    pub async fn ensure_index(&self) -> bool {
        let name = self.index.name();
        let ready = match self.index.exists().await {
            Ok(true) => {
                info!(index = name, "index already exists");
                true
            }
            result => {
                if let Err(e) = result {
                    warn!(index = name, error = %e, "could not check index existence, attempting creation");
                }
                match self.index.create(&self.schema()).await {
                    Ok(()) => {
                        info!(index = name, dims = self.options.dims, "created index");
                        true
                    }
                    Err(IndexError::AlreadyExists(_)) => {
                        debug!(index = name, "index was created concurrently");
                        true
                    }
                    Err(e) => {
                        warn!(index = name, error = %e, "could not create index, it might already exist");
                        false
                    }
                }
            }
        };
        self.index_ready.store(ready, Ordering::Release);
        ready
    }

    /// Whether the index has been confirmed or created by this store.
    pub fn index_ready(&self) -> bool {
        self.index_ready.load(Ordering::Acquire)
    }

    /// Insert or overwrite a rule. Returns the rule id.
    pub async fn upsert(&self, rule: NewRule) -> Result<String> {
        let id = rule.id();
        let embedding = self.embed_for_write(&rule).await;
        let now = Utc::now();
        let created_at = self.created_at_for(&id, now).await;

        if !self.index_ready() {
            info!(index = self.index.name(), "index not confirmed, ensuring it before write");
            if !self.ensure_index().await {
                warn!(index = self.index.name(), "writing without a confirmed index");
            }
        }

        let doc = rule.into_document(embedding, created_at, now);
        match self.index.put(&doc).await {
            Ok(()) => {}
            Err(IndexError::NotFound(_)) => {
                info!(index = self.index.name(), "index missing on write, creating it");
                self.ensure_index().await;
                self.index.put(&doc).await.map_err(|source| StoreError::Write {
                    rule_id: id.clone(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(StoreError::Write {
                    rule_id: id,
                    source,
                })
            }
        }

        info!(rule_id = %id, category = %doc.record.category, "loaded rule");
        Ok(id)
    }

    /// Similarity search, optionally restricted to one category.
    pub async fn query(&self, query: &RuleQuery) -> Result<RuleHits> {
        if query.text.trim().is_empty() {
            return Err(StoreError::validation("query must not be empty"));
        }
        if query.limit == 0 {
            return Err(StoreError::validation("limit must be positive"));
        }

        let vector = self
            .embedder
            .embed(&query.text)
            .await
            .and_then(|v| check_dims(v, self.options.dims))
            .map_err(StoreError::Embedding)?;

        let req = KnnRequest {
            vector: &vector,
            k: query.limit,
            category: query.category.as_deref(),
        };

        match self.index.knn_search(&req).await {
            Ok(found) => {
                let rules: Vec<ScoredRule> = found
                    .hits
                    .into_iter()
                    .map(|h| ScoredRule {
                        rule: h.record,
                        score: h.score.unwrap_or(0.0),
                    })
                    .collect();
                debug!(returned = rules.len(), total = found.total, "rule query complete");
                Ok(RuleHits {
                    rules,
                    total: found.total,
                })
            }
            Err(IndexError::NotFound(_)) => {
                info!(index = self.index.name(), "index does not exist yet, returning no rules");
                Ok(RuleHits::default())
            }
            Err(e) => Err(StoreError::Query(e)),
        }
    }

    /// All rules, highest priority first, newest first within a priority.
    pub async fn list(&self, limit: usize) -> Result<RuleList> {
        if limit == 0 {
            return Err(StoreError::validation("limit must be positive"));
        }

        let req = MatchAllRequest {
            size: limit,
            sort: vec![Sort::desc(SortField::Priority), Sort::desc(SortField::CreatedAt)],
        };

        match self.index.match_all(&req).await {
            Ok(found) => Ok(RuleList {
                rules: found.hits.into_iter().map(|h| h.record).collect(),
                total: found.total,
            }),
            Err(IndexError::NotFound(_)) => {
                info!(index = self.index.name(), "index does not exist yet, returning no rules");
                Ok(RuleList::default())
            }
            Err(e) => Err(StoreError::List(e)),
        }
    }

    /// Embed a rule for storage. A provider failure degrades ranking quality
    /// for this rule but must not block the write, so it yields a zero vector.
    async fn embed_for_write(&self, rule: &NewRule) -> Vec<f32> {
        let result = self
            .embedder
            .embed(&rule.embedding_text())
            .await
            .and_then(|v| check_dims(v, self.options.dims));
        match result {
            Ok(vector) => vector,
            Err(e) => {
                warn!(
                    rule_id = %rule.id(),
                    model = self.embedder.model_name(),
                    error = %e,
                    "embedding failed, storing zero vector"
                );
                zero_vector(self.options.dims)
            }
        }
    }

    async fn created_at_for(&self, id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        if !self.options.preserve_created_at {
            return now;
        }
        match self.index.get(id).await {
            Ok(Some(existing)) => existing.created_at,
            Ok(None) => now,
            Err(IndexError::NotFound(_)) => {
                self.index_ready.store(false, Ordering::Release);
                now
            }
            Err(e) => {
                debug!(rule_id = id, error = %e, "could not read existing rule, using current time");
                now
            }
        }
    }
}
