//! Result persistence.
//!
//! Episode results are written as JSONL in dataset order; batch metadata goes
//! to `<out>.meta.json` next to them.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use repair::looping::EpisodeResult;

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(flatten)]
    pub episode: EpisodeResult,
    /// Infrastructure error that aborted the episode; it then counts as failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata for a batch, persisted to `<out>.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMeta {
    pub dataset: String,
    /// SHA-256 of the dataset file for reproducibility tracking.
    pub dataset_sha256: String,
    pub tasks: usize,
    pub passed: usize,
    pub jobs: usize,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    /// Non-fatal errors (aborted episodes, episode logs that failed to write).
    pub errors: Vec<String>,
}

impl BatchMeta {
    pub fn new(
        dataset: &Path,
        dataset_sha256: String,
        jobs: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration = finished_at - started_at;
        Self {
            dataset: dataset.display().to_string(),
            dataset_sha256,
            tasks: 0,
            passed: 0,
            jobs,
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            errors: Vec::new(),
        }
    }
}

pub fn meta_path(out: &Path) -> PathBuf {
    let mut name = OsString::from(out.as_os_str());
    name.push(".meta.json");
    PathBuf::from(name)
}

pub fn write_results(path: &Path, records: &[ResultRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record).context("serialize result")?);
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write results {}", path.display()))
}

pub fn write_meta(path: &Path, meta: &BatchMeta) -> Result<()> {
    let contents = serde_json::to_string_pretty(meta).context("serialize meta")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write meta {}", path.display()))?;
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(task_id: &str, passed: bool, error: Option<&str>) -> ResultRecord {
        ResultRecord {
            episode: EpisodeResult {
                task_id: task_id.to_string(),
                passed,
                steps: 2,
                time_s: 0.5,
                trace: Vec::new(),
                transcript: Vec::new(),
                final_code: "x = 1".to_string(),
            },
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(
            meta_path(Path::new("out/results.jsonl")),
            PathBuf::from("out/results.jsonl.meta.json")
        );
    }

    #[test]
    fn results_are_one_flat_object_per_line() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested/results.jsonl");
        let records = vec![record("a", true, None), record("b", false, Some("boom"))];

        write_results(&path, &records).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["task_id"], "a");
        assert!(first.get("error").is_none());
        let second: ResultRecord = serde_json::from_str(lines[1]).expect("record");
        assert_eq!(second, records[1]);
    }

    #[test]
    fn sha256_is_hex_of_contents() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.jsonl");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
