//! Fan-out dispatch of one conversion request to every configured
//! translation agent, with bounded per-agent retry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;

use crate::capability::Capability;
use crate::knowledge::{self, KnowledgeStore};
use crate::normalize::{self, CandidateRecord};

/// Resolves one agent/model pairing to an invokable capability. An error
/// here means the agent cannot be addressed at all and is excluded from
/// retry immediately.
pub trait CapabilityResolver: Send + Sync {
    fn resolve(&self, agent_name: &str, model_spec: &str) -> Result<Arc<dyn Capability>>;
}

/// Per-agent dispatch state, index-aligned with the agent list.
#[derive(Debug, Clone)]
enum DispatchState {
    Succeeded(CandidateRecord),
    PendingRetry { reason: String },
    Failed { reason: String },
}

pub struct DispatchController<'a> {
    pub resolver: &'a dyn CapabilityResolver,
    pub knowledge: &'a KnowledgeStore,
    pub retry_limit: u32,
    pub retry_delay: Duration,
}

impl DispatchController<'_> {
    /// Dispatches `source_text` to every agent in `agent_models`
    /// concurrently, retrying only the failing subset for up to
    /// `retry_limit` further rounds. The output always contains one record
    /// per agent, in map iteration order; agents still failing after the
    /// final round come back as error records, never dropped.
    pub async fn dispatch_all(
        &self,
        source_text: &str,
        agent_models: &BTreeMap<String, String>,
    ) -> Vec<CandidateRecord> {
        let store = self.knowledge.load();
        let known_keys = store.keys().cloned().collect::<Vec<String>>();
        let keys = knowledge::relevant_keys(source_text, &known_keys);
        let digest = knowledge::format_for_prompt(&store, &keys);
        tracing::debug!(known = known_keys.len(), relevant = keys.len(), "knowledge digest prepared");

        let payload = json!({
            "sourceText": source_text,
            "knownTransformations": digest,
        });

        let agents = agent_models
            .iter()
            .map(|(name, model)| (name.as_str(), model.as_str()))
            .collect::<Vec<(&str, &str)>>();

        let mut clients: Vec<Option<Arc<dyn Capability>>> = Vec::with_capacity(agents.len());
        let mut states: Vec<DispatchState> = Vec::with_capacity(agents.len());
        for (name, model) in &agents {
            match self.resolver.resolve(name, model) {
                Ok(client) => {
                    clients.push(Some(client));
                    states.push(DispatchState::PendingRetry {
                        reason: format!("agent '{name}' was never dispatched"),
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        agent = %name,
                        model = %model,
                        error = %err,
                        "agent cannot be addressed; excluded from dispatch"
                    );
                    clients.push(None);
                    states.push(DispatchState::Failed {
                        reason: format!("agent '{name}' is not addressable: {err:#}"),
                    });
                }
            }
        }

        for round in 0..=self.retry_limit {
            let pending = states
                .iter()
                .enumerate()
                .filter(|(_, state)| matches!(state, DispatchState::PendingRetry { .. }))
                .filter_map(|(index, _)| clients[index].clone().map(|client| (index, client)))
                .collect::<Vec<(usize, Arc<dyn Capability>)>>();
            if pending.is_empty() {
                break;
            }

            if round > 0 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
            tracing::debug!(round, agents = pending.len(), "dispatch round started");

            let calls = pending.iter().map(|(_, client)| {
                let client = client.clone();
                let payload = payload.clone();
                async move { client.invoke(payload).await }
            });
            let results = join_all(calls).await;

            for ((index, _), result) in pending.iter().zip(results) {
                let agent_name = agents[*index].0;
                let outcome = match result {
                    Ok(raw) => normalize::normalize(&raw, agent_name)
                        .map_err(|failure| failure.to_string()),
                    Err(err) => Err(format!("{err:#}")),
                };
                states[*index] = match outcome {
                    Ok(record) => {
                        tracing::debug!(agent = %agent_name, round, "candidate accepted");
                        DispatchState::Succeeded(record)
                    }
                    Err(reason) => {
                        let reason = if round == 0 {
                            format!("agent '{agent_name}': {reason}")
                        } else {
                            format!(
                                "agent '{agent_name}': {reason} (retry round {round} of {})",
                                self.retry_limit
                            )
                        };
                        tracing::warn!(agent = %agent_name, round, reason = %reason, "dispatch attempt failed");
                        DispatchState::PendingRetry { reason }
                    }
                };
            }
        }

        agents
            .iter()
            .zip(states)
            .map(|((name, _), state)| match state {
                DispatchState::Succeeded(record) => record,
                DispatchState::PendingRetry { reason } | DispatchState::Failed { reason } => {
                    CandidateRecord::failed(name, reason)
                }
            })
            .collect()
    }
}
