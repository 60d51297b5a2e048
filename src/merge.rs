//! Synthesis of one answer from the surviving candidates. Successful
//! synthesis is also the only point at which new rules enter the
//! knowledge store.

use serde_json::json;

use crate::capability::Capability;
use crate::knowledge::KnowledgeStore;
use crate::normalize::{self, CandidateRecord, NormalizationFailure};

/// Prior answer and review feedback attached to a repeat synthesis call
/// during refinement.
#[derive(Debug, Clone)]
pub struct RefinementContext {
    pub previous_answer: String,
    pub feedback: String,
}

#[derive(Debug)]
pub enum MergeFailure {
    /// Every candidate failed; synthesis was not attempted.
    NoViableCandidates(String),
    /// The synthesis capability was unreachable or errored.
    Capability(String),
    /// The synthesis response did not normalize into a record.
    Normalization(NormalizationFailure),
    /// Synthesis produced an empty translation.
    EmptyTranslation,
}

impl std::fmt::Display for MergeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeFailure::NoViableCandidates(reasons) => {
                write!(f, "no viable candidates to merge: {reasons}")
            }
            MergeFailure::Capability(reason) => {
                write!(f, "synthesis capability failed: {reason}")
            }
            MergeFailure::Normalization(failure) => {
                write!(f, "synthesis response did not normalize: {failure}")
            }
            MergeFailure::EmptyTranslation => {
                write!(f, "synthesis produced an empty translation")
            }
        }
    }
}

/// Sends the viable candidates to the synthesis capability and returns the
/// chosen/merged record. Fails without calling the capability when no
/// candidate survived dispatch.
pub async fn merge_and_select(
    synthesis: &dyn Capability,
    knowledge: &KnowledgeStore,
    source_text: &str,
    candidates: &[CandidateRecord],
    refinement: Option<&RefinementContext>,
) -> Result<CandidateRecord, MergeFailure> {
    let viable = candidates
        .iter()
        .filter(|candidate| candidate.is_viable())
        .collect::<Vec<&CandidateRecord>>();
    if viable.is_empty() {
        let reasons = candidates
            .iter()
            .map(|candidate| {
                format!(
                    "{}: {}",
                    candidate.source_agent,
                    candidate.error.as_deref().unwrap_or("empty translation")
                )
            })
            .collect::<Vec<String>>()
            .join("; ");
        tracing::error!(candidates = candidates.len(), "no viable candidates to merge");
        return Err(MergeFailure::NoViableCandidates(reasons));
    }

    let mut payload = json!({
        "sourceText": source_text,
        "candidateTexts": viable
            .iter()
            .map(|candidate| candidate.translated_text.clone())
            .collect::<Vec<String>>(),
    });
    if let Some(context) = refinement
        && let Some(object) = payload.as_object_mut()
    {
        object.insert("previousAnswer".to_string(), json!(context.previous_answer));
        object.insert("feedback".to_string(), json!(context.feedback));
    }

    let raw = synthesis.invoke(payload).await.map_err(|err| {
        tracing::error!(error = %err, "synthesis capability failed");
        MergeFailure::Capability(format!("{err:#}"))
    })?;

    let record = normalize::normalize(&raw, synthesis.name()).map_err(|failure| {
        tracing::error!(reason = %failure, "synthesis response did not normalize");
        MergeFailure::Normalization(failure)
    })?;

    if record.translated_text.trim().is_empty() {
        tracing::error!("synthesis produced an empty translation");
        return Err(MergeFailure::EmptyTranslation);
    }

    if !record.applied_rules.is_empty() {
        let added = knowledge.save(&record.applied_rules);
        if added > 0 {
            tracing::info!(added, "learned transformation rules from synthesis");
        }
    }

    Ok(record)
}
