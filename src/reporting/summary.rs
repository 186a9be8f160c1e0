//! Machine-readable summary of a matrix run (`summary.json`).

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::models::{TestConfig, TestResult};
use crate::reporting::html::TIMESTAMP_FORMAT;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Serialize)]
struct SummaryEntry<'a> {
    config: &'a TestConfig,
    description: String,
    success: bool,
    results_dir: &'a Path,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    generated: String,
    success: bool,
    cells: Vec<SummaryEntry<'a>>,
}

/// Writes `<root>/summary.json` for the cells recorded by this invocation.
pub fn write_summary(results_root: &Path, results: &[(TestConfig, TestResult)]) -> Result<PathBuf> {
    let summary = Summary {
        generated: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        success: results.iter().all(|(_, result)| result.success),
        cells: results
            .iter()
            .map(|(config, result)| SummaryEntry {
                config,
                description: config.description(),
                success: result.success,
                results_dir: &result.results_dir,
            })
            .collect(),
    };
    fs::create_dir_all(results_root)
        .with_context(|| format!("Failed to create directory: {}", results_root.display()))?;
    let path = results_root.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
