use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

/// A capability response before normalization: either a structured record
/// or bare text whose shape is not yet known.
#[derive(Debug, Clone)]
pub enum RawResponse {
    Structured(Value),
    Text(String),
}

/// One opaque request/response service: a translation agent, the synthesis
/// capability, or the evaluator.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, payload: Value) -> Result<RawResponse>;
}

pub fn translator_instruction(source_dialect: &str, target_dialect: &str) -> String {
    format!(
        "You port {source_dialect} SQL to {target_dialect}.\n\
         The user payload is a JSON object with:\n\
         - \"sourceText\": the original {source_dialect} SQL\n\
         - \"knownTransformations\": previously observed rewrite rules\n\n\
         Respond ONLY with a JSON object:\n\
         {{\"translatedText\": \"<the {target_dialect} SQL>\",\n\
          \"appliedRules\": [{{\"from\": \"...\", \"to\": \"...\", \"context\": \"...\", \"example\": \"...\"}}]}}\n\
         Plain {target_dialect} SQL is also acceptable when no rules were applied."
    )
}

pub fn synthesis_instruction(source_dialect: &str, target_dialect: &str) -> String {
    format!(
        "The user payload is a JSON object with:\n\
         - \"sourceText\": the original {source_dialect} SQL\n\
         - \"candidateTexts\": a list of candidate {target_dialect} ports\n\
         - optionally \"previousAnswer\" and \"feedback\" from an earlier review\n\n\
         Decide which candidate best preserves the original intent, merging the\n\
         strengths of each where useful, and apply the feedback when present.\n\
         Respond ONLY with a JSON object:\n\
         {{\"translatedText\": \"<the final {target_dialect} SQL>\",\n\
          \"appliedRules\": [{{\"from\": \"...\", \"to\": \"...\", \"context\": \"...\", \"example\": \"...\"}}]}}"
    )
}

pub fn evaluator_instruction(source_dialect: &str, target_dialect: &str) -> String {
    format!(
        "Evaluate the quality and correctness of the ported {target_dialect} SQL.\n\
         The user payload is a JSON object with:\n\
         - \"sourceText\": the original {source_dialect} SQL\n\
         - \"translatedText\": the {target_dialect} SQL to be evaluated\n\n\
         Respond ONLY in the following format:\n\
         RATING: <EXCELLENT | GOOD | FAIR | POOR>\n\
         FEEDBACK: <explanation of any issues or improvements>"
    )
}

/// A capability reached over an OpenAI-compatible chat-completions endpoint.
pub struct HttpCapability {
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    instruction: String,
    client: reqwest::Client,
}

impl HttpCapability {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        instruction: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            instruction,
            client,
        }
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: Value) -> Result<RawResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": self.instruction},
                {"role": "user", "content": payload.to_string()},
            ],
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("capability '{}' unreachable at '{}'", self.name, url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "capability '{}' returned {}: {}",
                self.name,
                status,
                truncate_detail(&detail)
            ));
        }

        let completion = response.json::<Value>().await.with_context(|| {
            format!("capability '{}' returned a non-json completion body", self.name)
        })?;

        let content = completion
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                anyhow::anyhow!("capability '{}' completion carried no message content", self.name)
            })?;

        Ok(RawResponse::Text(content.to_string()))
    }
}

fn truncate_detail(detail: &str) -> &str {
    let trimmed = detail.trim();
    match trimmed.char_indices().nth(300) {
        Some((index, _)) => &trimmed[..index],
        None => trimmed,
    }
}
