//! Quality gate: evaluate the merged answer and refine it until the
//! configured minimum rating is met or the refinement budget is spent.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::capability::{Capability, RawResponse};
use crate::knowledge::KnowledgeStore;
use crate::merge::{self, RefinementContext};
use crate::normalize::CandidateRecord;

/// Ordinal quality labels reported by the evaluator. The ranking lives in
/// [`Rating::rank`], declared worst to best; the textual labels carry no
/// ordering of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Rating {
    pub fn rank(self) -> u8 {
        match self {
            Rating::Poor => 0,
            Rating::Fair => 1,
            Rating::Good => 2,
            Rating::Excellent => 3,
        }
    }

    pub fn meets(self, minimum: Rating) -> bool {
        self.rank() >= minimum.rank()
    }

    pub fn parse(label: &str) -> Option<Rating> {
        match label.trim().to_ascii_lowercase().as_str() {
            "poor" => Some(Rating::Poor),
            "fair" => Some(Rating::Fair),
            "good" => Some(Rating::Good),
            "excellent" => Some(Rating::Excellent),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rating::Poor => "POOR",
            Rating::Fair => "FAIR",
            Rating::Good => "GOOD",
            Rating::Excellent => "EXCELLENT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rating: Rating,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationFailure {
    pub reason: String,
}

impl std::fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evaluation failed: {}", self.reason)
    }
}

/// Parses an evaluator response: either a structured `{rating, feedback}`
/// object or the `RATING:`/`FEEDBACK:` text form.
pub fn parse_evaluation(raw: &RawResponse) -> Result<Evaluation, EvaluationFailure> {
    match raw {
        RawResponse::Structured(value) => evaluation_from_value(value),
        RawResponse::Text(text) => {
            let trimmed = text.trim();
            if let Ok(value) = serde_json::from_str::<Value>(trimmed)
                && value.is_object()
            {
                return evaluation_from_value(&value);
            }
            evaluation_from_text(trimmed)
        }
    }
}

fn evaluation_from_value(value: &Value) -> Result<Evaluation, EvaluationFailure> {
    let label = value
        .get("rating")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let rating = Rating::parse(label).ok_or_else(|| EvaluationFailure {
        reason: format!("unknown rating label '{label}'"),
    })?;
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Evaluation { rating, feedback })
}

fn evaluation_from_text(text: &str) -> Result<Evaluation, EvaluationFailure> {
    let mut rating = None;
    let mut feedback_lines: Vec<String> = Vec::new();
    let mut in_feedback = false;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = strip_prefix_ci(line, "RATING:") {
            rating = Rating::parse(rest);
            in_feedback = false;
        } else if let Some(rest) = strip_prefix_ci(line, "FEEDBACK:") {
            if !rest.is_empty() {
                feedback_lines.push(rest.to_string());
            }
            in_feedback = true;
        } else if in_feedback && !line.is_empty() {
            feedback_lines.push(line.to_string());
        }
    }

    let rating = rating.ok_or_else(|| EvaluationFailure {
        reason: "response carried no recognizable RATING line".to_string(),
    })?;
    Ok(Evaluation {
        rating,
        feedback: feedback_lines.join("\n"),
    })
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line[prefix.len()..].trim_start())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinementOutcome {
    /// The evaluator's rating met the configured minimum.
    Accepted,
    /// The refinement budget ran out before the minimum rating was met.
    Exhausted,
    /// A capability error interrupted the loop; the best answer so far
    /// stands.
    Interrupted,
}

#[derive(Debug)]
pub struct RefinedAnswer {
    pub record: CandidateRecord,
    pub rating: Option<Rating>,
    pub feedback: Option<String>,
    pub outcome: RefinementOutcome,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RefineSettings {
    pub min_rating: Rating,
    pub max_refinements: u32,
}

/// Runs the evaluate/refine loop over the merged candidate. Never loses
/// prior work: any capability error returns the best candidate obtained so
/// far with the error recorded.
pub async fn evaluate_and_refine(
    evaluator: &dyn Capability,
    synthesis: &dyn Capability,
    knowledge: &KnowledgeStore,
    source_text: &str,
    merged: CandidateRecord,
    settings: RefineSettings,
) -> RefinedAnswer {
    let mut best = merged;
    let mut last_rating = None;
    let mut last_feedback = None;
    let mut refinements = 0u32;

    loop {
        let payload = json!({
            "sourceText": source_text,
            "translatedText": best.translated_text,
        });
        let evaluation = match evaluator.invoke(payload).await {
            Ok(raw) => match parse_evaluation(&raw) {
                Ok(evaluation) => evaluation,
                Err(failure) => {
                    tracing::warn!(reason = %failure, "evaluator response was malformed; keeping best answer");
                    return RefinedAnswer {
                        record: best,
                        rating: last_rating,
                        feedback: last_feedback,
                        outcome: RefinementOutcome::Interrupted,
                        error: Some(failure.to_string()),
                    };
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "evaluator unreachable; keeping best answer");
                return RefinedAnswer {
                    record: best,
                    rating: last_rating,
                    feedback: last_feedback,
                    outcome: RefinementOutcome::Interrupted,
                    error: Some(format!("evaluation failed: {err:#}")),
                };
            }
        };

        tracing::info!(rating = evaluation.rating.label(), refinements, "evaluation completed");
        last_rating = Some(evaluation.rating);
        last_feedback = (!evaluation.feedback.is_empty()).then(|| evaluation.feedback.clone());

        if evaluation.rating.meets(settings.min_rating) {
            return RefinedAnswer {
                record: best,
                rating: last_rating,
                feedback: last_feedback,
                outcome: RefinementOutcome::Accepted,
                error: None,
            };
        }

        if refinements >= settings.max_refinements {
            tracing::info!(
                max_refinements = settings.max_refinements,
                "refinement budget exhausted; returning last candidate"
            );
            return RefinedAnswer {
                record: best,
                rating: last_rating,
                feedback: last_feedback,
                outcome: RefinementOutcome::Exhausted,
                error: None,
            };
        }
        refinements += 1;

        let context = RefinementContext {
            previous_answer: best.translated_text.clone(),
            feedback: evaluation.feedback.clone(),
        };
        let previous = vec![best.clone()];
        match merge::merge_and_select(synthesis, knowledge, source_text, &previous, Some(&context))
            .await
        {
            Ok(record) => best = record,
            Err(failure) => {
                tracing::warn!(reason = %failure, refinements, "refinement synthesis failed; keeping best answer");
                return RefinedAnswer {
                    record: best,
                    rating: last_rating,
                    feedback: last_feedback,
                    outcome: RefinementOutcome::Interrupted,
                    error: Some(failure.to_string()),
                };
            }
        }
    }
}
