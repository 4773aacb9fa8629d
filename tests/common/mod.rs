#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use governance_rules_core::embedding::{Embedder, EmbeddingError};
use governance_rules_core::index::memory::InMemoryIndex;
use governance_rules_core::index::{
    IndexError, IndexSchema, KnnRequest, MatchAllRequest, SearchHits, SearchIndex,
};
use governance_rules_core::models::{RuleDocument, RuleDraft, RuleRecord};
use governance_rules_core::{RuleStore, StoreOptions};

pub const DIMS: usize = 8;

const KEYWORDS: [&str; DIMS] = [
    "privacy", "personal", "data", "safety", "harm", "ethic", "fair", "security",
];

/// One axis per keyword; texts sharing keywords land close together.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|k| text.matches(k).count() as f32)
            .collect())
    }
}

/// Fails every call, like an unreachable provider.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Request("connection refused".into()))
    }
}

/// Panics on every call.
pub struct PanickingEmbedder;

#[async_trait]
impl Embedder for PanickingEmbedder {
    fn model_name(&self) -> &str {
        "panicking-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        panic!("embedder exploded");
    }
}

/// Which operation a [`FaultyIndex`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Ping,
    /// `exists` errors and `create` fails, so the index stays missing.
    Lifecycle,
    Put,
    Search,
}

/// Wraps an [`InMemoryIndex`] and injects one kind of failure.
pub struct FaultyIndex {
    pub inner: InMemoryIndex,
    fault: Fault,
    pub puts: AtomicUsize,
}

impl FaultyIndex {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryIndex::new("rules"),
            fault,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchIndex for FaultyIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ping(&self) -> Result<(), IndexError> {
        if self.fault == Fault::Ping {
            return Err(IndexError::Unreachable("connection refused".into()));
        }
        self.inner.ping().await
    }

    async fn exists(&self) -> Result<bool, IndexError> {
        if self.fault == Fault::Lifecycle {
            return Err(IndexError::Backend("403 forbidden".into()));
        }
        self.inner.exists().await
    }

    async fn create(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        if self.fault == Fault::Lifecycle {
            return Err(IndexError::Backend("403 forbidden".into()));
        }
        self.inner.create(schema).await
    }

    async fn put(&self, doc: &RuleDocument) -> Result<(), IndexError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Put {
            return Err(IndexError::Backend("mapper_parsing_exception".into()));
        }
        self.inner.put(doc).await
    }

    async fn get(&self, id: &str) -> Result<Option<RuleRecord>, IndexError> {
        self.inner.get(id).await
    }

    async fn knn_search(&self, req: &KnnRequest<'_>) -> Result<SearchHits, IndexError> {
        if self.fault == Fault::Search {
            return Err(IndexError::Backend("search_phase_execution_exception".into()));
        }
        self.inner.knn_search(req).await
    }

    async fn match_all(&self, req: &MatchAllRequest) -> Result<SearchHits, IndexError> {
        if self.fault == Fault::Search {
            return Err(IndexError::Backend("search_phase_execution_exception".into()));
        }
        self.inner.match_all(req).await
    }
}

pub fn options() -> StoreOptions {
    StoreOptions {
        dims: DIMS,
        preserve_created_at: true,
    }
}

/// A connected store over a fresh in-memory index.
pub async fn memory_store(embedder: Arc<dyn Embedder>) -> RuleStore {
    RuleStore::connect(Arc::new(InMemoryIndex::new("rules")), embedder, options())
        .await
        .expect("in-memory store connects")
}

pub fn rule(title: &str, text: &str, category: &str, priority: i64) -> RuleDraft {
    RuleDraft::new(title, text)
        .with_category(category)
        .with_priority(priority)
}

/// Five rules, two of them in `privacy`, priorities 9, 7, 5, 3, 1.
pub fn five_rules() -> Vec<RuleDraft> {
    vec![
        rule(
            "Protect Personal Data",
            "Never reveal personal data about individuals",
            "privacy",
            9,
        ),
        rule(
            "Refuse Harmful Requests",
            "Decline requests that could cause physical harm; safety first",
            "safety",
            7,
        ),
        rule(
            "Minimize Data",
            "Collect the minimum personal data needed; privacy by default",
            "privacy",
            5,
        ),
        rule(
            "Be Fair",
            "Treat every group fairly; ethics over convenience",
            "ethics",
            3,
        ),
        rule(
            "Rotate Credentials",
            "Security credentials must be rotated every 90 days",
            "security",
            1,
        ),
    ]
}

pub async fn load_all(store: &RuleStore, drafts: Vec<RuleDraft>) -> Vec<String> {
    let mut ids = Vec::new();
    for draft in drafts {
        ids.push(store.upsert(draft.validate().unwrap()).await.unwrap());
    }
    ids
}
