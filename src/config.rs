use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;
use crate::refine::Rating;

pub const DEFAULT_CONFIG_PATH: &str = "sqlporter.toml";
pub const DEFAULT_KNOWLEDGE_PATH: &str = "./knowledge/transformations.json";
pub const DEFAULT_INPUT_DIR: &str = "./ASIS";
pub const DEFAULT_OUTPUT_DIR: &str = "./TOBE";
pub const DEFAULT_REPORT_PATH: &str = "./reports/result_summary.json";
pub const DEFAULT_TELEMETRY_PATH: &str = ".sqlporter/telemetry.jsonl";

/// Resolved runtime settings: CLI flag > profile value > built-in default.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub agents: BTreeMap<String, String>,
    pub synthesis_model: String,
    pub evaluator_model: String,
    pub endpoints: HashMap<String, String>,
    pub api_key_env: HashMap<String, String>,
    pub source_dialect: String,
    pub target_dialect: String,
    pub input_dir: String,
    pub output_dir: String,
    pub report_path: String,
    pub knowledge_path: String,
    pub comment_prefix: String,
    pub retry_limit: u32,
    pub retry_delay_ms: u64,
    pub min_rating: Rating,
    pub max_refinements: u32,
    pub request_timeout_secs: u64,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
    pub synthesis_model: Option<String>,
    pub evaluator_model: Option<String>,
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub api_key_env: HashMap<String, String>,
    pub source_dialect: Option<String>,
    pub target_dialect: Option<String>,
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub report_path: Option<String>,
    pub knowledge_path: Option<String>,
    pub comment_prefix: Option<String>,
    pub retry_limit: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub min_rating: Option<Rating>,
    pub max_refinements: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check model specs and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let profile_name = cli.profile.clone();
    if profile_name != "default" && !profiles.profiles.contains_key(&profile_name) {
        return Err(anyhow::anyhow!(
            "profile '{}' not found in '{}'",
            profile_name,
            cli.config_path
        ));
    }
    let profile = profiles
        .profiles
        .get(&profile_name)
        .cloned()
        .unwrap_or_default();

    let mut agents = if profile.agents.is_empty() {
        default_agents()
    } else {
        profile.agents.clone()
    };
    for pair in &cli.agent_model {
        let (name, spec) = pair.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("--agent-model '{pair}' must look like '<name>=<provider>.<model>'")
        })?;
        if name.trim().is_empty() || spec.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "--agent-model '{pair}' must look like '<name>=<provider>.<model>'"
            ));
        }
        agents.insert(name.trim().to_string(), spec.trim().to_string());
    }

    Ok(RuntimeConfig {
        profile: profile_name,
        config_path: cli.config_path.clone(),
        agents,
        synthesis_model: profile
            .synthesis_model
            .unwrap_or_else(|| "openai.gpt-4o-mini".to_string()),
        evaluator_model: profile
            .evaluator_model
            .unwrap_or_else(|| "openai.gpt-4o-mini".to_string()),
        endpoints: profile.endpoints,
        api_key_env: profile.api_key_env,
        source_dialect: profile.source_dialect.unwrap_or_else(|| "Oracle".to_string()),
        target_dialect: profile
            .target_dialect
            .unwrap_or_else(|| "PostgreSQL".to_string()),
        input_dir: profile.input_dir.unwrap_or_else(|| DEFAULT_INPUT_DIR.to_string()),
        output_dir: profile
            .output_dir
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        report_path: profile
            .report_path
            .unwrap_or_else(|| DEFAULT_REPORT_PATH.to_string()),
        knowledge_path: cli
            .knowledge_path
            .clone()
            .or(profile.knowledge_path)
            .unwrap_or_else(|| DEFAULT_KNOWLEDGE_PATH.to_string()),
        comment_prefix: profile.comment_prefix.unwrap_or_else(|| "--".to_string()),
        retry_limit: cli.retry_limit.or(profile.retry_limit).unwrap_or(3),
        retry_delay_ms: cli.retry_delay_ms.or(profile.retry_delay_ms).unwrap_or(500),
        min_rating: cli
            .min_rating
            .or(profile.min_rating)
            .unwrap_or(Rating::Excellent),
        max_refinements: cli
            .max_refinements
            .or(profile.max_refinements)
            .unwrap_or(3),
        request_timeout_secs: profile.request_timeout_secs.unwrap_or(60),
        telemetry_enabled: profile.telemetry_enabled.unwrap_or(false),
        telemetry_path: profile
            .telemetry_path
            .unwrap_or_else(|| DEFAULT_TELEMETRY_PATH.to_string()),
    })
}

fn default_agents() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("converter_1".to_string(), "generic.gemma3:4b".to_string()),
        ("converter_2".to_string(), "generic.llama3.2:3b".to_string()),
        ("converter_3".to_string(), "openai.gpt-4o-mini".to_string()),
    ])
}

const SAMPLE_CONFIG: &str = r#"# sqlporter configuration. Every field is optional; built-in defaults apply.

[profiles.default]
synthesis_model = "openai.gpt-4o-mini"
evaluator_model = "openai.gpt-4o-mini"
source_dialect = "Oracle"
target_dialect = "PostgreSQL"
min_rating = "excellent"
max_refinements = 3
retry_limit = 3
retry_delay_ms = 500
request_timeout_secs = 60
input_dir = "./ASIS"
output_dir = "./TOBE"
report_path = "./reports/result_summary.json"
knowledge_path = "./knowledge/transformations.json"
comment_prefix = "--"
telemetry_enabled = false
telemetry_path = ".sqlporter/telemetry.jsonl"

[profiles.default.agents]
converter_1 = "generic.gemma3:4b"
converter_2 = "generic.llama3.2:3b"
converter_3 = "openai.gpt-4o-mini"

# Per-provider endpoint and api-key overrides. API keys are read from the
# environment, never from this file.
[profiles.default.endpoints]
generic = "http://localhost:11434/v1"

[profiles.default.api_key_env]
openai = "OPENAI_API_KEY"
"#;

/// Writes a commented sample configuration. Refuses to overwrite.
pub fn write_sample_config(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        return Err(anyhow::anyhow!(
            "config file '{}' already exists; delete it first to regenerate",
            path.display()
        ));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory '{}'", parent.display()))?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .with_context(|| format!("failed to write sample config to '{}'", path.display()))
}
