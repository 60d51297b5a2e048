//! SQL file discovery and result writing around the conversion pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::refine::Rating;

/// Recursively collects `*.sql` files under `input_dir`, sorted by path.
pub fn get_sql_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_sql_files(input_dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_sql_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read input directory '{}'", dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry under '{}'", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_sql_files(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
        {
            files.push(path);
        }
    }
    Ok(())
}

pub fn read_sql_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sql file '{}'", path.display()))
}

/// Writes `sql` under `output_base` as `<stem>_ported.sql`, mirroring
/// `input_path`'s position under `input_base`, with every comment line
/// prefixed.
pub fn write_sql_with_comment(
    output_base: &Path,
    input_base: &Path,
    input_path: &Path,
    sql: &str,
    comment: &str,
    prefix: &str,
) -> Result<PathBuf> {
    let relative = input_path.strip_prefix(input_base).unwrap_or(input_path);
    let stem = input_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("output");

    let mut output_path = output_base.join(relative);
    output_path.set_file_name(format!("{stem}_ported.sql"));
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create output directory '{}'", parent.display())
        })?;
    }

    let mut header = String::new();
    for line in comment.trim().lines() {
        header.push_str(prefix);
        header.push(' ');
        header.push_str(line.trim_end());
        header.push('\n');
    }
    header.push('\n');

    std::fs::write(&output_path, format!("{header}{sql}"))
        .with_context(|| format!("failed to write '{}'", output_path.display()))?;
    Ok(output_path)
}

#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversionReport {
    pub generated_at: String,
    pub total_files: usize,
    pub converted: usize,
    pub failed: usize,
    pub files: Vec<FileOutcome>,
}

pub fn write_report(path: &Path, report: &ConversionReport) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create report directory '{}'", parent.display())
        })?;
    }
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize conversion report")?;
    std::fs::write(path, payload)
        .with_context(|| format!("failed to write report to '{}'", path.display()))
}
