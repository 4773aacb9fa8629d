//! CLI command implementations.
//!
//! Each command runs one store operation and prints the result to stdout,
//! as pretty JSON for `list`, `query`, and `load`, and as a progress report
//! for `load-dir`. A failing JSON command prints `{"success": false, ...}`
//! before returning its error.

use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::warn;

use governance_rules_core::models::{RuleDraft, RuleQuery};
use governance_rules_core::RuleStore;

use crate::loader::{load_dir, RuleOutcome};

fn print_json(out: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(out)?);
    Ok(())
}

/// Print `err` as a failure document on stdout and hand it back.
fn failure(err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    let out = json!({ "success": false, "error": err.to_string() });
    if let Err(e) = print_json(&out) {
        warn!(error = %e, "could not print failure output");
    }
    err
}

pub async fn run_list(store: &RuleStore, limit: usize) -> Result<()> {
    let list = store.list(limit).await.map_err(failure)?;
    print_json(&json!({ "success": true, "rules": list.rules, "total": list.total }))
}

pub async fn run_query(store: &RuleStore, query: &RuleQuery) -> Result<()> {
    let hits = store.query(query).await.map_err(failure)?;
    print_json(&json!({ "success": true, "rules": hits.rules, "total": hits.total }))
}

pub async fn run_load(store: &RuleStore, draft: RuleDraft) -> Result<()> {
    let rule = draft.validate().map_err(failure)?;
    let rule_id = store.upsert(rule).await.map_err(failure)?;
    print_json(&json!({
        "success": true,
        "rule_id": rule_id,
        "message": "Rule loaded successfully"
    }))
}

/// Load every rule file in `dir`, then optionally run a sample query.
pub async fn run_load_dir(
    store: &RuleStore,
    dir: &Path,
    sample_query: Option<&str>,
) -> Result<()> {
    println!("Loading governance rules from {}...", dir.display());
    let report = load_dir(store, dir).await?;

    for file in &report.files {
        if let Some(ref err) = file.error {
            println!("Error loading rules from {}: {}", file.path.display(), err);
            continue;
        }
        println!(
            "Loaded {} rules from {}:",
            file.rules.len(),
            file.path.display()
        );
        for outcome in &file.rules {
            match outcome {
                RuleOutcome::Loaded { title, rule_id } => {
                    println!("  ok     {} ({})", title, rule_id)
                }
                RuleOutcome::Failed { title, error } => {
                    println!("  failed {}: {}", title, error)
                }
            }
        }
    }
    println!(
        "\nDone: {} loaded, {} failed.",
        report.loaded(),
        report.failed()
    );

    if let Some(text) = sample_query {
        println!("\nTesting query: '{}'", text);
        let hits = store.query(&RuleQuery::new(text).limit(3)).await?;
        println!("Found {} relevant rules:", hits.rules.len());
        for hit in &hits.rules {
            println!("  - {} (score: {:.3})", hit.rule.title, hit.score);
        }
    }

    Ok(())
}
