//! In-memory [`SearchIndex`] implementation for local runs and tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. The map is `None` until
//! [`create`](SearchIndex::create) is called, so reads and writes against an
//! uncreated index behave like a freshly provisioned backend
//! ([`IndexError::NotFound`]).
//!
//! k-NN search is brute-force cosine similarity over every document that
//! passes the category filter. Scores follow the `cosinesimil` convention
//! of the OpenSearch k-NN plugin, `1 / (2 - cos)`, so they land in
//! `[1/3, 1]` with higher meaning closer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{RuleDocument, RuleRecord};

use super::{
    Hit, IndexError, IndexSchema, KnnRequest, MatchAllRequest, SearchHits, SearchIndex, Sort,
    SortField,
};

type Docs = Option<HashMap<String, RuleDocument>>;

/// In-memory rule index.
pub struct InMemoryIndex {
    name: String,
    docs: RwLock<Docs>,
}

impl InMemoryIndex {
    /// A handle to an index that does not exist yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(None),
        }
    }

    /// Number of stored documents (0 when the index does not exist).
    pub fn len(&self) -> usize {
        self.docs
            .read()
            .map(|d| d.as_ref().map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Docs>, IndexError> {
        self.docs
            .read()
            .map_err(|_| IndexError::Backend("in-memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Docs>, IndexError> {
        self.docs
            .write()
            .map_err(|_| IndexError::Backend("in-memory index lock poisoned".into()))
    }

    fn not_found(&self) -> IndexError {
        IndexError::NotFound(self.name.clone())
    }
}

fn compare(a: &RuleRecord, b: &RuleRecord, sort: &[Sort]) -> Ordering {
    for clause in sort {
        let ord = match clause.field {
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        let ord = if clause.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.rule_id.cmp(&b.rule_id)
}

fn knn_score(cos: f32) -> f64 {
    1.0 / (2.0 - cos as f64)
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn exists(&self) -> Result<bool, IndexError> {
        Ok(self.read()?.is_some())
    }

    async fn create(&self, _schema: &IndexSchema) -> Result<(), IndexError> {
        let mut docs = self.write()?;
        if docs.is_some() {
            return Err(IndexError::AlreadyExists(self.name.clone()));
        }
        *docs = Some(HashMap::new());
        Ok(())
    }

    async fn put(&self, doc: &RuleDocument) -> Result<(), IndexError> {
        let mut guard = self.write()?;
        let docs = guard.as_mut().ok_or_else(|| self.not_found())?;
        docs.insert(doc.id().to_string(), doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RuleRecord>, IndexError> {
        let guard = self.read()?;
        let docs = guard.as_ref().ok_or_else(|| self.not_found())?;
        Ok(docs.get(id).map(|d| d.record.clone()))
    }

    async fn knn_search(&self, req: &KnnRequest<'_>) -> Result<SearchHits, IndexError> {
        let guard = self.read()?;
        let docs = guard.as_ref().ok_or_else(|| self.not_found())?;

        let mut hits: Vec<Hit> = docs
            .values()
            .filter(|d| req.category.map_or(true, |c| d.record.category == c))
            .map(|d| Hit {
                record: d.record.clone(),
                score: Some(knn_score(cosine_similarity(req.vector, &d.embedding))),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.rule_id.cmp(&b.record.rule_id))
        });
        hits.truncate(req.k);

        // Like the k-NN plugin, the hit count is bounded by k.
        let total = hits.len() as u64;
        Ok(SearchHits { hits, total })
    }

    async fn match_all(&self, req: &MatchAllRequest) -> Result<SearchHits, IndexError> {
        let guard = self.read()?;
        let docs = guard.as_ref().ok_or_else(|| self.not_found())?;

        let mut records: Vec<&RuleRecord> = docs.values().map(|d| &d.record).collect();
        records.sort_by(|a, b| compare(a, b, &req.sort));

        let hits = records
            .into_iter()
            .take(req.size)
            .map(|r| Hit {
                record: r.clone(),
                score: None,
            })
            .collect();

        Ok(SearchHits {
            hits,
            total: docs.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleDraft;
    use chrono::{Duration, Utc};

    fn doc(text: &str, category: &str, priority: i64, embedding: Vec<f32>) -> RuleDocument {
        let now = Utc::now();
        RuleDraft::new(format!("title {}", text), text)
            .with_category(category)
            .with_priority(priority)
            .validate()
            .unwrap()
            .into_document(embedding, now, now)
    }

    async fn created() -> InMemoryIndex {
        let index = InMemoryIndex::new("rules");
        index.create(&IndexSchema::new(2)).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_uncreated_index_reports_not_found() {
        let index = InMemoryIndex::new("rules");
        assert!(!index.exists().await.unwrap());
        let err = index
            .match_all(&MatchAllRequest {
                size: 10,
                sort: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotFound(ref n) if n == "rules"));
        let err = index.put(&doc("a", "general", 1, vec![1.0, 0.0])).await;
        assert!(matches!(err, Err(IndexError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let index = created().await;
        let err = index.create(&IndexSchema::new(2)).await.unwrap_err();
        assert!(matches!(err, IndexError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_put_replaces_by_id() {
        let index = created().await;
        index.put(&doc("same", "general", 1, vec![1.0, 0.0])).await.unwrap();
        index.put(&doc("same", "privacy", 5, vec![1.0, 0.0])).await.unwrap();
        assert_eq!(index.len(), 1);
        let got = index.get(&crate::models::rule_id("same")).await.unwrap().unwrap();
        assert_eq!(got.category, "privacy");
        assert_eq!(got.priority, 5);
    }

    #[tokio::test]
    async fn test_knn_orders_by_similarity_and_filters() {
        let index = created().await;
        index.put(&doc("east", "geo", 1, vec![1.0, 0.0])).await.unwrap();
        index.put(&doc("north", "geo", 1, vec![0.0, 1.0])).await.unwrap();
        index.put(&doc("northeast", "other", 1, vec![0.7, 0.7])).await.unwrap();

        let all = index
            .knn_search(&KnnRequest {
                vector: &[1.0, 0.1],
                k: 10,
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(all.hits[0].record.rule_text, "east");
        assert_eq!(all.hits[1].record.rule_text, "northeast");
        assert!(all.hits.windows(2).all(|w| w[0].score >= w[1].score));

        let geo = index
            .knn_search(&KnnRequest {
                vector: &[1.0, 0.1],
                k: 10,
                category: Some("geo"),
            })
            .await
            .unwrap();
        assert_eq!(geo.total, 2);
        assert!(geo.hits.iter().all(|h| h.record.category == "geo"));
    }

    #[tokio::test]
    async fn test_knn_score_bounds() {
        assert!((knn_score(1.0) - 1.0).abs() < 1e-9);
        assert!((knn_score(-1.0) - 1.0 / 3.0).abs() < 1e-9);
        assert!((knn_score(0.0) - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_match_all_sorts_and_caps() {
        let index = created().await;
        let base = Utc::now();
        for (i, (text, priority)) in [("a", 3), ("b", 9), ("c", 3)].iter().enumerate() {
            let mut d = doc(text, "general", *priority, vec![1.0, 0.0]);
            d.record.created_at = base + Duration::seconds(i as i64);
            index.put(&d).await.unwrap();
        }

        let page = index
            .match_all(&MatchAllRequest {
                size: 2,
                sort: vec![Sort::desc(SortField::Priority), Sort::desc(SortField::CreatedAt)],
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let texts: Vec<&str> = page.hits.iter().map(|h| h.record.rule_text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert!(page.hits.iter().all(|h| h.score.is_none()));
    }
}
