//! Resolution of `<provider>.<model>` specs to HTTP capabilities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::capability::{self, Capability, HttpCapability};
use crate::config::RuntimeConfig;
use crate::dispatch::CapabilityResolver;

/// Known providers with their default endpoint and API-key env var. All
/// speak the OpenAI-compatible chat-completions protocol.
const PROVIDERS: &[(&str, &str, Option<&str>)] = &[
    ("openai", "https://api.openai.com/v1", Some("OPENAI_API_KEY")),
    ("deepseek", "https://api.deepseek.com/v1", Some("DEEPSEEK_API_KEY")),
    ("groq", "https://api.groq.com/openai/v1", Some("GROQ_API_KEY")),
    ("generic", "http://localhost:11434/v1", None),
];

/// Splits a model spec like `openai.gpt-4o-mini` into provider and model.
pub fn split_model_spec(spec: &str) -> Result<(&str, &str)> {
    let (provider, model) = spec.split_once('.').ok_or_else(|| {
        anyhow::anyhow!("model spec '{spec}' must look like '<provider>.<model>'")
    })?;
    if provider.trim().is_empty() || model.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "model spec '{spec}' must look like '<provider>.<model>'"
        ));
    }
    Ok((provider, model))
}

/// Builds HTTP capabilities for translation agents and the fixed
/// synthesis/evaluator roles, sharing one connection pool.
pub struct ProviderResolver {
    endpoints: HashMap<String, String>,
    api_key_env: HashMap<String, String>,
    translator_instruction: String,
    client: reqwest::Client,
}

impl ProviderResolver {
    pub fn new(cfg: &RuntimeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            endpoints: cfg.endpoints.clone(),
            api_key_env: cfg.api_key_env.clone(),
            translator_instruction: capability::translator_instruction(
                &cfg.source_dialect,
                &cfg.target_dialect,
            ),
            client,
        })
    }

    /// Builds a capability for a non-translator role (synthesis,
    /// evaluator) with its own system instruction.
    pub fn capability_for(
        &self,
        name: &str,
        model_spec: &str,
        instruction: String,
    ) -> Result<Arc<dyn Capability>> {
        self.build(name, model_spec, instruction)
    }

    fn build(
        &self,
        name: &str,
        model_spec: &str,
        instruction: String,
    ) -> Result<Arc<dyn Capability>> {
        let (provider, model) = split_model_spec(model_spec)?;
        let (endpoint, api_key) = self.provider_transport(provider)?;
        Ok(Arc::new(HttpCapability::new(
            name,
            model,
            endpoint,
            api_key,
            instruction,
            self.client.clone(),
        )))
    }

    fn provider_transport(&self, provider: &str) -> Result<(String, Option<String>)> {
        let known = PROVIDERS.iter().find(|(name, _, _)| *name == provider);

        let endpoint = self
            .endpoints
            .get(provider)
            .cloned()
            .or_else(|| known.map(|(_, endpoint, _)| endpoint.to_string()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown provider '{provider}'; configure an endpoint for it or use one of \
                     openai, deepseek, groq, generic"
                )
            })?;

        let key_env = self
            .api_key_env
            .get(provider)
            .cloned()
            .or_else(|| known.and_then(|(_, _, env)| env.map(str::to_string)));

        let api_key = match key_env {
            Some(env) => match std::env::var(&env) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => {
                    return Err(anyhow::anyhow!(
                        "provider '{provider}' requires api key env '{env}' but it is not set"
                    ));
                }
            },
            None => None,
        };

        Ok((endpoint, api_key))
    }
}

impl CapabilityResolver for ProviderResolver {
    fn resolve(&self, agent_name: &str, model_spec: &str) -> Result<Arc<dyn Capability>> {
        self.build(agent_name, model_spec, self.translator_instruction.clone())
    }
}
