//! Persisted mapping from source-dialect patterns to known rewrites, fed
//! back into conversion prompts as context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::normalize::RuleApplication;

pub const NO_KNOWN_RULES: &str = "No known transformation rules available.";

/// One rewrite recorded under a source pattern. Two rewrites under the same
/// pattern never share the same `(to, context)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownRewrite {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

pub type TransformationMap = BTreeMap<String, Vec<KnownRewrite>>;

/// The single writer of the persisted rule file. Storage trouble degrades
/// to an empty map on load and a skipped write on save; the pipeline never
/// fails because the store is unavailable.
#[derive(Debug)]
pub struct KnowledgeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> TransformationMap {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "knowledge base not found; starting empty");
            return TransformationMap::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read knowledge base; starting empty"
                );
                return TransformationMap::new();
            }
        };

        match serde_json::from_str::<TransformationMap>(&content) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "knowledge base is not a valid transformation map; starting empty"
                );
                TransformationMap::new()
            }
        }
    }

    /// Merges `new_rules` into the persisted state and returns the number
    /// of rewrites actually added. Rewrites duplicating an existing
    /// `(to, context)` pair under the same pattern are suppressed. An empty
    /// or fully-duplicate input performs no I/O.
    pub fn save(&self, new_rules: &[RuleApplication]) -> usize {
        let sanitized = new_rules
            .iter()
            .filter_map(RuleApplication::sanitized)
            .collect::<Vec<RuleApplication>>();
        if sanitized.is_empty() {
            return 0;
        }

        // Read-merge-write must not interleave with a concurrent save.
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut map = self.load();
        let mut added = 0usize;
        for rule in &sanitized {
            let rewrites = map.entry(rule.from.clone()).or_default();
            let duplicate = rewrites
                .iter()
                .any(|known| known.to == rule.to && known.context == rule.context);
            if duplicate {
                continue;
            }
            rewrites.push(KnownRewrite {
                to: rule.to.clone(),
                context: rule.context.clone(),
                example: rule.example.clone(),
            });
            added += 1;
        }

        if added == 0 {
            tracing::debug!("no new transformations to save");
            return 0;
        }

        if let Err(err) = self.persist(&map) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to persist knowledge base; keeping previous state"
            );
            return 0;
        }

        tracing::info!(path = %self.path.display(), added, "knowledge base updated");
        added
    }

    fn persist(&self, map: &TransformationMap) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create knowledge directory '{}'", parent.display())
            })?;
        }

        let payload =
            serde_json::to_string_pretty(map).context("failed to serialize knowledge base")?;
        std::fs::write(&self.path, payload)
            .with_context(|| format!("failed to write knowledge base to '{}'", self.path.display()))
    }
}

/// Subset of `known_keys` occurring, case-insensitively, in `text`. Bounds
/// prompt size by only injecting rules relevant to the current input.
pub fn relevant_keys(text: &str, known_keys: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    known_keys
        .iter()
        .filter(|key| !key.trim().is_empty() && haystack.contains(&key.to_lowercase()))
        .cloned()
        .collect()
}

/// Renders the selected rules as contextual hints for a downstream request.
pub fn format_for_prompt(map: &TransformationMap, keys: &[String]) -> String {
    if keys.is_empty() {
        return NO_KNOWN_RULES.to_string();
    }

    let mut out = String::from("Here are some known transformation rules:\n");
    for key in keys {
        let Some(rewrites) = map.get(key) else {
            continue;
        };
        for rewrite in rewrites {
            out.push_str(&format!("- {} -> {}", key, rewrite.to));
            if let Some(context) = &rewrite.context {
                out.push_str(&format!(" ({context})"));
            }
            out.push('\n');
            if let Some(example) = &rewrite.example {
                out.push_str(&format!("  example: {example}\n"));
            }
        }
    }
    out.trim_end().to_string()
}
