//! Store construction from configuration.
//!
//! The `memory` backend lives only as long as the process. It is meant for
//! local experiments with `rules serve` and for tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use governance_rules_core::index::memory::InMemoryIndex;
use governance_rules_core::index::SearchIndex;
use governance_rules_core::{RuleStore, StoreOptions};

use crate::aws::SigV4Signer;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::opensearch::OpenSearchIndex;

/// Build the search index named by `[index].backend`.
pub fn create_index(config: &Config) -> Result<Arc<dyn SearchIndex>> {
    let name = config.index.name.clone();
    let index: Arc<dyn SearchIndex> = match config.index.backend.as_str() {
        "memory" => Arc::new(InMemoryIndex::new(name)),
        "opensearch" => {
            let endpoint = config
                .index
                .endpoint
                .as_deref()
                .context("index.endpoint (or OPENSEARCH_ENDPOINT) is required")?;
            let signer = SigV4Signer::from_env(&config.index.region, "es");
            if signer.is_none() {
                warn!("no AWS credentials in environment, OpenSearch requests will be unsigned");
            }
            Arc::new(OpenSearchIndex::new(
                endpoint,
                name,
                Duration::from_secs(config.index.timeout_secs),
                signer,
            )?)
        }
        other => bail!("Unknown index backend: {}", other),
    };
    Ok(index)
}

pub fn store_options(config: &Config) -> StoreOptions {
    StoreOptions {
        dims: config.index.dims,
        preserve_created_at: config.store.preserve_created_at,
    }
}

/// Connect the rule store. Fails if the search backend is unreachable.
pub async fn open_store(config: &Config) -> Result<RuleStore> {
    let index = create_index(config)?;
    let embedder = create_embedder(config)?;
    info!(
        backend = %config.index.backend,
        index = %config.index.name,
        embedding = embedder.model_name(),
        "opening rule store"
    );

    RuleStore::connect(index, embedder, store_options(config))
        .await
        .context("Failed to connect to the search backend")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = parse_config(
            "[index]\nbackend = \"memory\"\nname = \"t\"\ndims = 8\n[embedding]\nprovider = \"disabled\"\n[store]\npreserve_created_at = false\n",
        )
        .unwrap();
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.index_name(), "t");
        assert_eq!(store.options().dims, 8);
        assert!(!store.options().preserve_created_at);
    }

    #[test]
    fn test_opensearch_requires_endpoint() {
        let config = Config::default();
        assert!(create_index(&config).is_err());
    }
}
