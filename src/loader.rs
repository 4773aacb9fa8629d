//! Bulk loading of rule files.
//!
//! A rules directory holds `*.json` files, each containing a JSON array of
//! rule objects in the same shape `POST /rules` accepts:
//!
//! ```json
//! [
//!   { "title": "Protect Personal Data", "rule_text": "Never reveal ...", "category": "privacy", "priority": 9 }
//! ]
//! ```
//!
//! Files are read in name order. A file that cannot be parsed, or a rule
//! that fails to load, is recorded in the [`LoadReport`] and loading
//! carries on with the rest.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use governance_rules_core::models::RuleDraft;
use governance_rules_core::RuleStore;

/// Outcome of loading one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Loaded { title: String, rule_id: String },
    Failed { title: String, error: String },
}

/// Outcome of loading one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    /// Set when the file itself could not be read or parsed.
    pub error: Option<String>,
    pub rules: Vec<RuleOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, RuleOutcome::Loaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, RuleOutcome::Failed { .. }))
            .count()
            + self.files.iter().filter(|f| f.error.is_some()).count()
    }

    fn outcomes(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.files.iter().flat_map(|f| f.rules.iter())
    }
}

/// The `*.json` files directly inside `dir`, sorted by name.
pub fn rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Rules directory not found: {}", dir.display());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_rule_file(path: &Path) -> Result<Vec<RuleDraft>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON array of rules", path.display()))
}

/// Upsert every rule in every file under `dir`.
pub async fn load_dir(store: &RuleStore, dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    for path in rule_files(dir)? {
        let drafts = match read_rule_file(&path) {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping rule file");
                report.files.push(FileReport {
                    path,
                    error: Some(format!("{:#}", e)),
                    rules: Vec::new(),
                });
                continue;
            }
        };

        info!(file = %path.display(), count = drafts.len(), "loading rules");
        let mut rules = Vec::with_capacity(drafts.len());
        for draft in drafts {
            rules.push(load_one(store, draft).await);
        }
        report.files.push(FileReport {
            path,
            error: None,
            rules,
        });
    }

    Ok(report)
}

async fn load_one(store: &RuleStore, draft: RuleDraft) -> RuleOutcome {
    let title = draft.title.clone().unwrap_or_else(|| "(untitled)".to_string());
    let result = match draft.validate() {
        Ok(rule) => store.upsert(rule).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(rule_id) => RuleOutcome::Loaded { title, rule_id },
        Err(e) => RuleOutcome::Failed {
            title,
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_files_sorted_json_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "[]").unwrap();
        std::fs::write(dir.path().join("a.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = rule_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rule_files(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_read_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privacy.json");
        std::fs::write(
            &path,
            r#"[{"title":"A","rule_text":"a","priority":9},{"title":"B"}]"#,
        )
        .unwrap();
        let drafts = read_rule_file(&path).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].priority, Some(9));
        assert!(drafts[1].rule_text.is_none());
    }

    #[test]
    fn test_report_counts() {
        let report = LoadReport {
            files: vec![
                FileReport {
                    path: "a.json".into(),
                    error: None,
                    rules: vec![
                        RuleOutcome::Loaded {
                            title: "A".into(),
                            rule_id: "x".into(),
                        },
                        RuleOutcome::Failed {
                            title: "B".into(),
                            error: "e".into(),
                        },
                    ],
                },
                FileReport {
                    path: "b.json".into(),
                    error: Some("bad json".into()),
                    rules: vec![],
                },
            ],
        };
        assert_eq!(report.loaded(), 1);
        assert_eq!(report.failed(), 2);
    }
}
