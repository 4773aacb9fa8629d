//! # Governance Rules
//!
//! A semantic store for short governance rules. Rules are embedded with a
//! text-embedding model and stored in an OpenSearch k-NN index; callers
//! list them by priority or retrieve the ones most similar to a topic.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ ┌──────────┐ ┌──────────┐
//! │   CLI    │ │   HTTP   │ │   MCP    │
//! │ (rules)  │ │  (axum)  │ │ (stdio)  │
//! └────┬─────┘ └────┬─────┘ └────┬─────┘
//!      └────────────┼────────────┘
//!                   ▼
//!             ┌───────────┐
//!             │ RuleStore │  governance-rules-core
//!             └─────┬─────┘
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!   ┌─────────────┐   ┌────────────┐
//!   │  Embedder   │   │ OpenSearch │
//!   │ Bedrock/... │   │  k-NN      │
//!   └─────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | Tracing subscriber setup |
//! | [`aws`] | SigV4 request signing |
//! | [`opensearch`] | OpenSearch search index |
//! | [`embedding`] | Bedrock, OpenAI, and Ollama embedders |
//! | [`backend`] | Store construction from config |
//! | [`server`] | HTTP API |
//! | [`mcp`] | MCP tool bridge |
//! | [`loader`] | Bulk loading of rule files |
//! | [`commands`] | CLI command implementations |

pub mod aws;
pub mod backend;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod loader;
pub mod logging;
pub mod mcp;
pub mod opensearch;
pub mod server;
