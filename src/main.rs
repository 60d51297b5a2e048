use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::level_filters::LevelFilter;

use sqlporter::capability;
use sqlporter::cli::{
    Cli, Commands, ConfigCommands, KnowledgeCommands, ProfileCommands, TelemetryCommands,
};
use sqlporter::config::{self, RuntimeConfig};
use sqlporter::error::{categorize_error, format_cli_error};
use sqlporter::file_io::{self, ConversionReport, FileOutcome};
use sqlporter::knowledge::{self, KnowledgeStore};
use sqlporter::pipeline::{Pipeline, PipelineSettings};
use sqlporter::profiles::{run_profiles_list, run_profiles_show};
use sqlporter::provider::ProviderResolver;
use sqlporter::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;

    if let Commands::Config {
        command: ConfigCommands::Init,
    } = &cli.command
    {
        config::write_sample_config(&cli.config_path)?;
        println!("Sample configuration written to '{}'.", cli.config_path);
        return Ok(());
    }

    let profiles = config::load_profiles(&cli.config_path)?;
    let cfg = config::resolve_runtime_config(&cli, &profiles)?;

    match cli.command {
        Commands::Convert {
            input_dir,
            output_dir,
        } => run_convert(&cfg, input_dir, output_dir).await,
        Commands::Knowledge {
            command: KnowledgeCommands::Show,
        } => run_knowledge_show(&cfg),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg),
            ProfileCommands::Show => run_profiles_show(&cfg),
        },
        Commands::Config { .. } => Ok(()),
        Commands::Telemetry {
            command: TelemetryCommands::Report { path, limit },
        } => run_telemetry_report(&cfg, path, limit),
    }
}

async fn run_convert(
    cfg: &RuntimeConfig,
    input_dir: Option<String>,
    output_dir: Option<String>,
) -> Result<()> {
    let input_dir = PathBuf::from(input_dir.unwrap_or_else(|| cfg.input_dir.clone()));
    let output_dir = PathBuf::from(output_dir.unwrap_or_else(|| cfg.output_dir.clone()));

    let telemetry = TelemetrySink::new(cfg, "convert".to_string());
    let pipeline = build_pipeline(cfg, telemetry.clone())?;

    let files = file_io::get_sql_files(&input_dir)?;
    if files.is_empty() {
        println!("No .sql files found under '{}'.", input_dir.display());
        return Ok(());
    }
    tracing::info!(files = files.len(), input = %input_dir.display(), "starting conversion run");

    let mut outcomes: Vec<FileOutcome> = Vec::new();
    for path in &files {
        let name = path
            .strip_prefix(&input_dir)
            .unwrap_or(path)
            .display()
            .to_string();
        tracing::info!(file = %name, "converting");

        let source = match file_io::read_sql_file(path) {
            Ok(source) => source,
            Err(err) => {
                telemetry.emit("file.failed", json!({"file": name, "error": format!("{err:#}")}));
                outcomes.push(FileOutcome {
                    file: name,
                    status: "error".to_string(),
                    rating: None,
                    message: Some(format!("{err:#}")),
                });
                continue;
            }
        };

        let result = pipeline.convert(&source, &cfg.agents).await;
        if result.is_total_failure() {
            telemetry.emit("file.failed", json!({"file": name, "error": result.error}));
            outcomes.push(FileOutcome {
                file: name,
                status: "error".to_string(),
                rating: None,
                message: result.error,
            });
            continue;
        }

        let comment = format!("Converted from: {name}");
        let out_path = file_io::write_sql_with_comment(
            &output_dir,
            &input_dir,
            path,
            &result.translated_text,
            &comment,
            &cfg.comment_prefix,
        )?;
        telemetry.emit(
            "file.completed",
            json!({"file": name, "outcome": result.outcome, "rating": result.rating}),
        );

        let status = if result.error.is_some() {
            "degraded"
        } else {
            "success"
        };
        println!("{} -> {}", name, out_path.display());
        outcomes.push(FileOutcome {
            file: name,
            status: status.to_string(),
            rating: result.rating,
            message: result.error.or(result.feedback),
        });
    }

    let converted = outcomes
        .iter()
        .filter(|outcome| outcome.status != "error")
        .count();
    let report = ConversionReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        total_files: files.len(),
        converted,
        failed: files.len() - converted,
        files: outcomes,
    };
    file_io::write_report(Path::new(&cfg.report_path), &report)?;
    telemetry.emit(
        "run.completed",
        json!({"total": report.total_files, "converted": report.converted, "failed": report.failed}),
    );

    println!(
        "Converted {}/{} files. Report written to {}",
        report.converted, report.total_files, cfg.report_path
    );
    Ok(())
}

fn build_pipeline(cfg: &RuntimeConfig, telemetry: TelemetrySink) -> Result<Pipeline> {
    let resolver = Arc::new(ProviderResolver::new(cfg)?);
    let synthesis = resolver.capability_for(
        "synthesis",
        &cfg.synthesis_model,
        capability::synthesis_instruction(&cfg.source_dialect, &cfg.target_dialect),
    )?;
    let evaluator = resolver.capability_for(
        "evaluator",
        &cfg.evaluator_model,
        capability::evaluator_instruction(&cfg.source_dialect, &cfg.target_dialect),
    )?;

    Ok(Pipeline {
        resolver,
        synthesis,
        evaluator,
        knowledge: Arc::new(KnowledgeStore::new(&cfg.knowledge_path)),
        telemetry,
        settings: PipelineSettings {
            retry_limit: cfg.retry_limit,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            min_rating: cfg.min_rating,
            max_refinements: cfg.max_refinements,
        },
    })
}

fn run_knowledge_show(cfg: &RuntimeConfig) -> Result<()> {
    let store = KnowledgeStore::new(&cfg.knowledge_path);
    let map = store.load();
    if map.is_empty() {
        println!("Knowledge base at '{}' is empty.", cfg.knowledge_path);
        return Ok(());
    }

    let keys = map.keys().cloned().collect::<Vec<String>>();
    println!(
        "Knowledge base at '{}' ({} patterns):",
        cfg.knowledge_path,
        map.len()
    );
    println!("{}", knowledge::format_for_prompt(&map, &keys));
    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
