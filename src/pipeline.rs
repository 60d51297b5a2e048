//! The end-to-end conversion pipeline: dispatch, merge, evaluate, refine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::capability::Capability;
use crate::dispatch::{CapabilityResolver, DispatchController};
use crate::knowledge::KnowledgeStore;
use crate::merge::{self, MergeFailure};
use crate::normalize::{CandidateRecord, RuleApplication};
use crate::refine::{self, Rating, RefineSettings, RefinementOutcome};
use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineOutcome {
    /// The final answer met the configured minimum rating.
    Accepted,
    /// The refinement budget ran out; the last candidate is returned.
    Exhausted,
    /// A stage failed but a usable translation survived.
    Degraded,
    /// No translation could be produced for this input.
    Failed,
}

/// The externally visible outcome of one conversion. A non-empty error
/// with non-empty text is a degraded success; a non-empty error with empty
/// text is a total failure.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub translated_text: String,
    pub applied_rules: Vec<RuleApplication>,
    pub rating: Option<Rating>,
    pub feedback: Option<String>,
    pub outcome: PipelineOutcome,
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn is_total_failure(&self) -> bool {
        self.error.is_some() && self.translated_text.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry_limit: u32,
    pub retry_delay: Duration,
    pub min_rating: Rating,
    pub max_refinements: u32,
}

pub struct Pipeline {
    pub resolver: Arc<dyn CapabilityResolver>,
    pub synthesis: Arc<dyn Capability>,
    pub evaluator: Arc<dyn Capability>,
    pub knowledge: Arc<KnowledgeStore>,
    pub telemetry: TelemetrySink,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Converts one input text through dispatch, merge, and the
    /// evaluate/refine loop. Never panics and never raises: every failure
    /// mode is folded into the returned [`PipelineResult`].
    pub async fn convert(
        &self,
        source_text: &str,
        agent_models: &BTreeMap<String, String>,
    ) -> PipelineResult {
        let controller = DispatchController {
            resolver: self.resolver.as_ref(),
            knowledge: self.knowledge.as_ref(),
            retry_limit: self.settings.retry_limit,
            retry_delay: self.settings.retry_delay,
        };
        let candidates = controller.dispatch_all(source_text, agent_models).await;
        let viable = candidates.iter().filter(|c| c.is_viable()).count();
        tracing::info!(total = candidates.len(), viable, "dispatch completed");
        self.telemetry.emit(
            "dispatch.completed",
            json!({"agents": candidates.len(), "viable": viable}),
        );

        let merged = match merge::merge_and_select(
            self.synthesis.as_ref(),
            &self.knowledge,
            source_text,
            &candidates,
            None,
        )
        .await
        {
            Ok(record) => {
                self.telemetry
                    .emit("merge.completed", json!({"rules": record.applied_rules.len()}));
                record
            }
            Err(failure) => return merge_fallback(&candidates, failure),
        };

        let refined = refine::evaluate_and_refine(
            self.evaluator.as_ref(),
            self.synthesis.as_ref(),
            &self.knowledge,
            source_text,
            merged,
            RefineSettings {
                min_rating: self.settings.min_rating,
                max_refinements: self.settings.max_refinements,
            },
        )
        .await;
        self.telemetry.emit(
            "refine.finished",
            json!({"outcome": refined.outcome, "rating": refined.rating}),
        );

        let outcome = match refined.outcome {
            RefinementOutcome::Accepted => PipelineOutcome::Accepted,
            RefinementOutcome::Exhausted => PipelineOutcome::Exhausted,
            RefinementOutcome::Interrupted => PipelineOutcome::Degraded,
        };

        PipelineResult {
            translated_text: refined.record.translated_text,
            applied_rules: refined.record.applied_rules,
            rating: refined.rating,
            feedback: refined.feedback,
            outcome,
            error: refined.error,
        }
    }
}

/// A failed merge still carries the best candidate text forward when any
/// candidate survived dispatch.
fn merge_fallback(candidates: &[CandidateRecord], failure: MergeFailure) -> PipelineResult {
    match candidates.iter().find(|candidate| candidate.is_viable()) {
        Some(record) => PipelineResult {
            translated_text: record.translated_text.clone(),
            applied_rules: record.applied_rules.clone(),
            rating: None,
            feedback: None,
            outcome: PipelineOutcome::Degraded,
            error: Some(failure.to_string()),
        },
        None => PipelineResult {
            translated_text: String::new(),
            applied_rules: Vec::new(),
            rating: None,
            feedback: None,
            outcome: PipelineOutcome::Failed,
            error: Some(failure.to_string()),
        },
    }
}
