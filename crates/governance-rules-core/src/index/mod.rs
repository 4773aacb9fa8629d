//! Search index abstraction.
//!
//! The [`SearchIndex`] trait is everything the rule store needs from a
//! k-nearest-neighbor document store: a connectivity check, lazy schema
//! creation, keyed writes, keyed reads, filtered k-NN search, and a sorted
//! match-all read. Implementations decide how similarity is scored; the
//! store never re-ranks.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::DEFAULT_DIMS;
use crate::models::{RuleDocument, RuleRecord};

/// Errors reported by a [`SearchIndex`].
///
/// Backends must classify failures into these variants: the store's
/// degraded-mode policy depends on telling `NotFound` and `AlreadyExists`
/// apart from everything else.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The backend could not be reached at all (connect failure, timeout).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The index does not exist.
    #[error("index not found: {0}")]
    NotFound(String),

    /// The index already exists (creation race).
    #[error("index already exists: {0}")]
    AlreadyExists(String),

    /// Any other backend-reported failure.
    #[error("{0}")]
    Backend(String),
}

/// Schema parameters for the rule index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    /// Dimension of the `embedding` field.
    pub dimension: usize,
    pub shards: u32,
    pub replicas: u32,
    /// HNSW `ef_search` at query time.
    pub ef_search: u32,
}

impl IndexSchema {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            shards: 1,
            replicas: 0,
            ef_search: 100,
        }
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

/// A filtered nearest-neighbor search on the `embedding` field.
///
/// `k` is both the neighbor count and the page size. When `category` is
/// set the backend must constrain the neighbor search itself, not filter
/// the page afterwards.
#[derive(Debug, Clone)]
pub struct KnnRequest<'a> {
    pub vector: &'a [f32],
    pub k: usize,
    pub category: Option<&'a str>,
}

/// A sortable field of a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Priority,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Field name in the index mapping.
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Priority => "priority",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

/// One sort clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub descending: bool,
}

impl Sort {
    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }
}

/// An unfiltered read of every document, sorted by `sort` (first clause
/// wins, later clauses break ties) and capped at `size`.
#[derive(Debug, Clone)]
pub struct MatchAllRequest {
    pub size: usize,
    pub sort: Vec<Sort>,
}

/// One search hit. `record` never carries the embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub record: RuleRecord,
    /// Similarity score for k-NN hits; `None` for sorted reads.
    pub score: Option<f64>,
}

/// A page of hits plus the backend's total hit count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub hits: Vec<Hit>,
    pub total: u64,
}

/// Abstract k-NN document store for rules.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](SearchIndex::ping) | Verify the backend is reachable |
/// | [`exists`](SearchIndex::exists) | Check whether the index exists |
/// | [`create`](SearchIndex::create) | Create the index with a schema |
/// | [`put`](SearchIndex::put) | Insert or replace a document by id |
/// | [`get`](SearchIndex::get) | Fetch one document by id |
/// | [`knn_search`](SearchIndex::knn_search) | Filtered nearest-neighbor search |
/// | [`match_all`](SearchIndex::match_all) | Sorted read of all documents |
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Name of the index this handle targets.
    fn name(&self) -> &str;

    /// Check the backend is reachable. Errors here mean the backend is unusable.
    async fn ping(&self) -> Result<(), IndexError>;

    async fn exists(&self) -> Result<bool, IndexError>;

    /// Create the index. Must return [`IndexError::AlreadyExists`] when it
    /// is already there.
    async fn create(&self, schema: &IndexSchema) -> Result<(), IndexError>;

    /// Insert or replace the document keyed by its `rule_id`. Must return
    /// [`IndexError::NotFound`] if the index has not been created and the
    /// backend does not create it implicitly.
    async fn put(&self, doc: &RuleDocument) -> Result<(), IndexError>;

    async fn get(&self, id: &str) -> Result<Option<RuleRecord>, IndexError>;

    async fn knn_search(&self, req: &KnnRequest<'_>) -> Result<SearchHits, IndexError>;

    async fn match_all(&self, req: &MatchAllRequest) -> Result<SearchHits, IndexError>;
}
