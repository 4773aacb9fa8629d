//! # Governance Rules CLI (`rules`)
//!
//! ## Usage
//!
//! ```bash
//! rules --config ./rules.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rules serve` | Start the HTTP API |
//! | `rules mcp` | Serve the MCP tools over stdio |
//! | `rules list` | List rules by priority |
//! | `rules query "<text>"` | Similarity search |
//! | `rules load <title> <rule_text>` | Load one rule |
//! | `rules load-dir <dir>` | Load every `*.json` rule file in a directory |
//!
//! ## Examples
//!
//! ```bash
//! # Load the bundled samples and check retrieval
//! rules load-dir sample-rules --sample-query "personal data privacy"
//!
//! # Privacy rules relevant to a topic
//! rules query "sharing customer emails" --category privacy --limit 3
//!
//! # Start the API against a local OpenSearch
//! OPENSEARCH_ENDPOINT=http://localhost:9200 rules serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use governance_rules::backend::open_store;
use governance_rules::mcp::McpBridge;
use governance_rules::{commands, config, logging, server};
use governance_rules_core::models::{RuleDraft, RuleQuery};

/// Governance rule store: load rules, then retrieve them by priority or by
/// semantic similarity.
#[derive(Parser)]
#[command(name = "rules", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used if it does not
    /// exist.
    #[arg(long, global = true, default_value = "rules.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Serve the MCP tools over stdin/stdout.
    Mcp,

    /// List rules, highest priority first.
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Find the rules most similar to a text.
    Query {
        text: String,

        /// Only return rules in this category.
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Load (or replace) a single rule.
    Load {
        title: String,
        rule_text: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "general")]
        category: String,

        /// Priority, 1-10, higher is more important.
        #[arg(long, default_value_t = 5)]
        priority: i64,

        #[arg(long, num_args = 1..)]
        tags: Vec<String>,
    },

    /// Load every `*.json` rule file in a directory.
    LoadDir {
        #[arg(default_value = "sample-rules")]
        dir: PathBuf,

        /// Run this query after loading to check retrieval.
        #[arg(long)]
        sample_query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;
    let store = Arc::new(open_store(&cfg).await?);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, store).await?;
        }
        Commands::Mcp => {
            McpBridge::new(store).serve_stdio().await?;
        }
        Commands::List { limit } => {
            commands::run_list(&store, limit).await?;
        }
        Commands::Query {
            text,
            category,
            limit,
        } => {
            let mut query = RuleQuery::new(text).limit(limit);
            query.category = category;
            commands::run_query(&store, &query).await?;
        }
        Commands::Load {
            title,
            rule_text,
            description,
            category,
            priority,
            tags,
        } => {
            let draft = RuleDraft::new(title, rule_text)
                .with_description(description)
                .with_category(category)
                .with_priority(priority)
                .with_tags(tags);
            commands::run_load(&store, draft).await?;
        }
        Commands::LoadDir { dir, sample_query } => {
            commands::run_load_dir(&store, &dir, sample_query.as_deref()).await?;
        }
    }

    Ok(())
}
