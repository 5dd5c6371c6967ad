//! Scoring of a results file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Fields scored per result line; everything else is ignored.
#[derive(Debug, Deserialize)]
struct ScoredRecord {
    passed: bool,
    #[serde(default)]
    steps: u32,
    #[serde(default)]
    time_s: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub n: usize,
    pub passed: usize,
    pub pass_at_1: f64,
    pub avg_steps: Option<f64>,
    pub avg_time_s: Option<f64>,
}

pub fn aggregate(results_path: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let raw = fs::read_to_string(results_path)
        .with_context(|| format!("read {}", results_path.display()))?;
    Ok(summarize(&raw))
}

fn summarize(raw: &str) -> (ReportSummary, Vec<String>) {
    let mut warnings = Vec::new();
    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ScoredRecord>(line) {
            Ok(record) => records.push(record),
            Err(err) => warnings.push(format!("skip line {}: {err}", idx + 1)),
        }
    }

    let n = records.len();
    let passed = records.iter().filter(|r| r.passed).count();
    let mean = |total: f64| (n > 0).then(|| total / n as f64);
    let summary = ReportSummary {
        n,
        passed,
        pass_at_1: mean(passed as f64).unwrap_or(0.0),
        avg_steps: mean(records.iter().map(|r| f64::from(r.steps)).sum()),
        avg_time_s: mean(records.iter().map(|r| r.time_s).sum()),
    };
    (summary, warnings)
}
