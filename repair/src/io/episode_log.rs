//! Per-episode artifacts written under a log directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::looping::EpisodeResult;

#[derive(Debug, Clone)]
pub struct EpisodePaths {
    pub dir: PathBuf,
    pub result_path: PathBuf,
    pub transcript_path: PathBuf,
    pub final_code_path: PathBuf,
}

impl EpisodePaths {
    pub fn new(root: &Path, task_id: &str) -> Self {
        let dir = root.join(dir_name(task_id));
        Self {
            dir: dir.clone(),
            result_path: dir.join("result.json"),
            transcript_path: dir.join("transcript.json"),
            final_code_path: dir.join("final_code.py"),
        }
    }
}

/// Task ids like `HumanEval/0` become a single path component.
///
/// Ids that needed rewriting get a short digest of the raw id appended, so two
/// ids never share a directory.
fn dir_name(task_id: &str) -> String {
    let name: String = task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = match name.trim_matches('.') {
        "" => "task".to_string(),
        _ => name,
    };
    if name == task_id {
        return name;
    }
    let digest = hex::encode(Sha256::digest(task_id.as_bytes()));
    format!("{name}-{}", &digest[..8])
}

pub fn write_episode(root: &Path, result: &EpisodeResult) -> Result<EpisodePaths> {
    let paths = EpisodePaths::new(root, &result.task_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create episode dir {}", paths.dir.display()))?;

    write_json(&paths.result_path, result)?;
    write_json(&paths.transcript_path, &result.transcript)?;
    write_text(&paths.final_code_path, &result.final_code)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
