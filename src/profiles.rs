use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("Dialects: {} -> {}", cfg.source_dialect, cfg.target_dialect);
    println!("Agents:");
    for (name, model) in &cfg.agents {
        println!("- {name}: {model}");
    }
    println!("Synthesis model: {}", cfg.synthesis_model);
    println!("Evaluator model: {}", cfg.evaluator_model);
    println!("Min rating: {}", cfg.min_rating.label());
    println!("Max refinements: {}", cfg.max_refinements);
    println!("Retry limit: {}", cfg.retry_limit);
    println!("Retry delay (ms): {}", cfg.retry_delay_ms);
    println!("Request timeout (secs): {}", cfg.request_timeout_secs);
    println!("Input dir: {}", cfg.input_dir);
    println!("Output dir: {}", cfg.output_dir);
    println!("Report path: {}", cfg.report_path);
    println!("Knowledge path: {}", cfg.knowledge_path);
    println!("Comment prefix: {}", cfg.comment_prefix);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
