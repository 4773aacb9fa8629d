//! # Governance Rules Core
//!
//! Runtime-agnostic logic for the governance rule store: rule models and
//! identity, the search index and embedder traits, an in-memory index, and
//! the [`RuleStore`](store::RuleStore) that composes them.
//!
//! This crate contains no tokio, HTTP client, or other network
//! dependencies. Concrete backends live in the `governance-rules` app crate.

pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{RuleStore, StoreOptions};
