//! Rule data models.
//!
//! A rule enters the system as a [`RuleDraft`] (every optional field
//! absent-able, straight off the wire), is validated exactly once into a
//! [`NewRule`], and is persisted as a [`RuleDocument`]. Callers only ever see
//! [`RuleRecord`]s, which carry everything except the embedding vector.
//!
//! # Identity
//!
//! A rule's id is derived from its `rule_text` alone via [`rule_id`]. Title,
//! description and metadata do not participate, so re-submitting the same
//! text with new metadata overwrites the earlier document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Category assigned when a draft does not name one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Priority assigned when a draft does not set one.
pub const DEFAULT_PRIORITY: i64 = 1;

/// Number of hex characters kept from the rule text digest.
pub const RULE_ID_LEN: usize = 12;

/// Derive the document id for a rule from its text.
///
/// The id is the first [`RULE_ID_LEN`] lowercase hex characters of the
/// SHA-256 digest of `rule_text`.
///
/// ```rust
/// use governance_rules_core::models::rule_id;
///
/// let a = rule_id("Do not expose personal data");
/// assert_eq!(a.len(), 12);
/// assert_eq!(a, rule_id("Do not expose personal data"));
/// ```
pub fn rule_id(rule_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..RULE_ID_LEN].to_string()
}

/// Unvalidated rule input as it arrives from HTTP, MCP, the CLI, or a
/// sample-rules file.
///
/// Every field is optional at this stage so that missing required fields
/// surface as validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleDraft {
    pub title: Option<String>,
    pub rule_text: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
}

impl RuleDraft {
    pub fn new(title: impl Into<String>, rule_text: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            rule_text: Some(rule_text.into()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Apply defaults and check required fields.
    ///
    /// `title` and `rule_text` must be present and non-blank. A blank
    /// category falls back to [`DEFAULT_CATEGORY`]; duplicate tags collapse.
    /// `priority` must fit the index's 32-bit integer mapping.
    pub fn validate(self) -> Result<NewRule, StoreError> {
        let title = required(self.title, "title")?;
        let rule_text = required(self.rule_text, "rule_text")?;
        let priority = self.priority.unwrap_or(DEFAULT_PRIORITY);
        if i32::try_from(priority).is_err() {
            return Err(StoreError::validation(format!(
                "priority must fit in a 32-bit integer, got {}",
                priority
            )));
        }
        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(NewRule {
            title,
            rule_text,
            description: self.description.unwrap_or_default(),
            category,
            priority,
            tags: self.tags.unwrap_or_default().into_iter().collect(),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, StoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StoreError::Validation(format!("{} must not be empty", field))),
    }
}

/// A validated rule ready for upsert. Only obtainable via
/// [`RuleDraft::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    title: String,
    rule_text: String,
    description: String,
    category: String,
    priority: i64,
    tags: BTreeSet<String>,
}

impl NewRule {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rule_text(&self) -> &str {
        &self.rule_text
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// The document id this rule resolves to.
    pub fn id(&self) -> String {
        rule_id(&self.rule_text)
    }

    /// Text fed to the embedding provider: `title description rule_text`.
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.rule_text)
    }

    /// Assemble the stored document.
    pub fn into_document(
        self,
        embedding: Vec<f32>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> RuleDocument {
        RuleDocument {
            record: RuleRecord {
                rule_id: rule_id(&self.rule_text),
                title: self.title,
                description: self.description,
                category: self.category,
                priority: self.priority,
                tags: self.tags,
                rule_text: self.rule_text,
                created_at,
                updated_at,
            },
            embedding,
        }
    }
}

/// A stored rule as returned to callers (no embedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub rule_text: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// RFC 3339 timestamps on the way out. On the way in, documents written
/// without an offset (`2024-05-01T09:30:00.123456`) are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(D::Error::custom)
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

/// The full document written to the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(flatten)]
    pub record: RuleRecord,
    pub embedding: Vec<f32>,
}

impl RuleDocument {
    pub fn id(&self) -> &str {
        &self.record.rule_id
    }
}

/// A rule returned from similarity search, with the backend's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRule {
    #[serde(flatten)]
    pub rule: RuleRecord,
    pub score: f64,
}

/// Result of [`RuleStore::list`](crate::store::RuleStore::list).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleList {
    pub rules: Vec<RuleRecord>,
    /// Total matching documents, independent of the returned page.
    pub total: u64,
}

/// Result of [`RuleStore::query`](crate::store::RuleStore::query).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleHits {
    pub rules: Vec<ScoredRule>,
    /// Total hits as reported by the backend.
    pub total: u64,
}

/// Default number of results for a similarity query.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Default number of results for a listing.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// A similarity query against the rule store.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleQuery {
    pub text: String,
    pub category: Option<String>,
    pub limit: usize,
}

impl RuleQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
