use clap::{Parser, Subcommand};

use crate::refine::Rating;

#[derive(Debug, Parser)]
#[command(
    name = "sqlporter",
    version,
    about = "Multi-agent SQL dialect porter with a quality-gated refinement loop"
)]
pub struct Cli {
    /// Tracing filter, e.g. 'info' or 'sqlporter=debug'
    #[arg(long, global = true, default_value = "info")]
    pub log_filter: String,

    #[arg(long, global = true, default_value = "sqlporter.toml")]
    pub config_path: String,

    #[arg(long, global = true, default_value = "default")]
    pub profile: String,

    /// Override one agent/model pairing, e.g. converter_1=openai.gpt-4o-mini
    #[arg(long, global = true, value_name = "NAME=SPEC")]
    pub agent_model: Vec<String>,

    /// Additional retry rounds for failing agents during dispatch
    #[arg(long, global = true)]
    pub retry_limit: Option<u32>,

    /// Delay between dispatch retry rounds
    #[arg(long, global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Minimum evaluator rating that stops the refinement loop
    #[arg(long, global = true, value_enum)]
    pub min_rating: Option<Rating>,

    /// Maximum synthesis passes after the initial merge
    #[arg(long, global = true)]
    pub max_refinements: Option<u32>,

    #[arg(long, global = true)]
    pub knowledge_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Convert every .sql file under the input directory")]
    Convert {
        #[arg(long)]
        input_dir: Option<String>,
        #[arg(long)]
        output_dir: Option<String>,
    },
    #[command(about = "Inspect the transformation knowledge base")]
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommands,
    },
    #[command(about = "List or show configuration profiles")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Manage the configuration file")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    #[command(about = "Summarize the telemetry event log")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum KnowledgeCommands {
    #[command(about = "Print every known transformation rule")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Write a commented sample configuration file")]
    Init,
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize recent telemetry events")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 200)]
        limit: usize,
    },
}
