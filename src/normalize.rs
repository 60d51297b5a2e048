//! Boundary normalization of heterogeneous capability responses into one
//! canonical candidate shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::RawResponse;

/// One discrete transformation observed or proposed by a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleApplication {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl RuleApplication {
    /// Trims both patterns and drops rules that are empty or map a pattern
    /// onto itself. The sanitized form is the only shape the knowledge
    /// store accepts.
    pub fn sanitized(&self) -> Option<RuleApplication> {
        let from = self.from.trim();
        let to = self.to.trim();
        if from.is_empty() || to.is_empty() || from == to {
            return None;
        }

        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };

        Some(RuleApplication {
            from: from.to_string(),
            to: to.to_string(),
            context: clean(&self.context),
            example: clean(&self.example),
        })
    }
}

/// The canonical per-agent result record. A record without an error always
/// carries a non-empty translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub translated_text: String,
    #[serde(default)]
    pub applied_rules: Vec<RuleApplication>,
    #[serde(default)]
    pub source_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CandidateRecord {
    pub fn failed(agent: &str, reason: String) -> Self {
        Self {
            translated_text: String::new(),
            applied_rules: Vec::new(),
            source_agent: agent.to_string(),
            error: Some(reason),
        }
    }

    pub fn is_viable(&self) -> bool {
        self.error.is_none() && !self.translated_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationFailure {
    pub reason: String,
    pub raw_type: &'static str,
}

impl std::fmt::Display for NormalizationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot normalize {} response: {}", self.raw_type, self.reason)
    }
}

/// Leading tokens that mark bare text as SQL rather than prose.
const SQL_LEADING_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "create", "alter", "drop", "with", "truncate",
    "merge", "grant", "revoke", "begin", "declare", "comment", "do",
];

pub fn looks_like_sql(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with("--") || trimmed.starts_with("/*") {
        return true;
    }

    let first_word = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    SQL_LEADING_KEYWORDS.contains(&first_word.as_str())
}

/// Converts a raw capability response into a [`CandidateRecord`].
///
/// Structured records and JSON-encoded text must carry a non-empty
/// `translatedText` field; bare text is accepted only when it reads as SQL.
/// A structurally valid object lacking the text field is a failure, never a
/// best-effort partial success.
pub fn normalize(raw: &RawResponse, agent: &str) -> Result<CandidateRecord, NormalizationFailure> {
    match raw {
        RawResponse::Structured(value) => record_from_value(value, agent, "structured"),
        RawResponse::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(NormalizationFailure {
                    reason: "empty text response".to_string(),
                    raw_type: "text",
                });
            }

            if let Ok(value) = serde_json::from_str::<Value>(trimmed)
                && value.is_object()
            {
                return record_from_value(&value, agent, "json-text");
            }

            if looks_like_sql(trimmed) {
                return Ok(CandidateRecord {
                    translated_text: trimmed.to_string(),
                    applied_rules: Vec::new(),
                    source_agent: agent.to_string(),
                    error: None,
                });
            }

            Err(NormalizationFailure {
                reason: "text is neither a json record nor sql".to_string(),
                raw_type: "text",
            })
        }
    }
}

fn record_from_value(
    value: &Value,
    agent: &str,
    raw_type: &'static str,
) -> Result<CandidateRecord, NormalizationFailure> {
    let Some(object) = value.as_object() else {
        return Err(NormalizationFailure {
            reason: "response is not a json object".to_string(),
            raw_type,
        });
    };

    let translated = object
        .get("translatedText")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if translated.is_empty() {
        return Err(NormalizationFailure {
            reason: "missing or empty 'translatedText' field".to_string(),
            raw_type,
        });
    }

    let applied_rules = object
        .get("appliedRules")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<RuleApplication>(item.clone()).ok())
                .filter_map(|rule| rule.sanitized())
                .collect::<Vec<RuleApplication>>()
        })
        .unwrap_or_default();

    Ok(CandidateRecord {
        translated_text: translated.to_string(),
        applied_rules,
        source_agent: agent.to_string(),
        error: None,
    })
}
