//! JSONL dataset loading.
//!
//! Accepts HumanEvalFix-style records and their common variants: the id, tests
//! and buggy program may each live under one of several keys. Records without a
//! buggy program but with an `entry_point` get a stub that only defines the
//! entry point.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use repair::core::types::Task;

const ID_KEYS: [&str; 2] = ["task_id", "id"];
const TESTS_KEYS: [&str; 2] = ["tests", "test"];
const CODE_KEYS: [&str; 3] = ["buggy_code", "buggy_solution", "buggy"];

static SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\([^)]*\)\s*(?:->[^:\n]*)?:")
        .expect("signature pattern should be valid")
});

/// Selection applied after loading.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selection {
    /// Keep only the first N tasks.
    pub subset: Option<usize>,
    /// Shuffle deterministically before truncating.
    pub seed: Option<u64>,
}

pub fn load_dataset(path: &Path, selection: Selection) -> Result<Vec<Task>> {
    if !path.exists() {
        bail!("dataset not found: {}", path.display());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut tasks = parse_jsonl(&raw).with_context(|| format!("parse {}", path.display()))?;

    if let Some(seed) = selection.seed {
        tasks.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    if let Some(subset) = selection.subset {
        tasks.truncate(subset);
    }
    debug!(tasks = tasks.len(), "dataset loaded");
    Ok(tasks)
}

fn parse_jsonl(raw: &str) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> =
            serde_json::from_str(line).with_context(|| format!("line {}", idx + 1))?;
        match task_from_record(&record) {
            Some(task) => tasks.push(task),
            None => warn!(line = idx + 1, "skipping record without id, tests or code"),
        }
    }
    Ok(tasks)
}

fn task_from_record(record: &Map<String, Value>) -> Option<Task> {
    let task_id = first_text(record, &ID_KEYS)?;
    let tests = first_text(record, &TESTS_KEYS)?;
    let code = first_text(record, &CODE_KEYS).or_else(|| {
        let entry_point = first_text(record, &["entry_point"])?;
        let prompt = first_text(record, &["prompt"]);
        Some(entry_point_stub(&entry_point, prompt.as_deref()))
    })?;
    Some(Task::new(task_id, code, tests))
}

/// First non-blank value among `keys`. Numbers count as text.
fn first_text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// A body-less definition of the entry point.
///
/// Keeps the signature from `prompt` when one is present, preferring the
/// definition named after the entry point.
fn entry_point_stub(entry_point: &str, prompt: Option<&str>) -> String {
    let signature = prompt.and_then(|prompt| {
        let found: Vec<(&str, &str)> = SIGNATURE_RE
            .captures_iter(prompt)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(0)?.as_str())))
            .collect();
        found
            .iter()
            .find(|(name, _)| *name == entry_point)
            .or(found.first())
            .map(|(_, signature)| *signature)
    });
    match signature {
        Some(signature) => format!("{signature}\n    pass\n"),
        None => format!("def {entry_point}(*args, **kwargs):\n    pass\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(raw: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("data.jsonl");
        fs::write(&path, raw).expect("write");
        (temp, path)
    }

    #[test]
    fn reads_fallback_keys_and_skips_blank_lines() {
        let raw = concat!(
            r#"{"task_id":"a","buggy_code":"x = 1\r\n","tests":"def test_a(): pass"}"#,
            "\n\n",
            r#"{"id":7,"buggy_solution":"y = 2","test":"def test_b(): pass"}"#,
            "\n",
        );
        let (_temp, path) = write(raw);

        let tasks = load_dataset(&path, Selection::default()).expect("load");

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].code, "x = 1\n");
        assert_eq!(tasks[1].task_id, "7");
        assert_eq!(tasks[1].code, "y = 2");
    }

    #[test]
    fn blank_value_falls_through_to_next_key() {
        let raw = r#"{"task_id":"a","buggy_code":"  ","buggy":"z = 3","tests":"t"}"#;
        let (_temp, path) = write(raw);
        let tasks = load_dataset(&path, Selection::default()).expect("load");
        assert_eq!(tasks[0].code, "z = 3");
    }

    #[test]
    fn skips_incomplete_records() {
        let raw = concat!(
            r#"{"task_id":"no-tests","buggy_code":"x"}"#,
            "\n",
            r#"{"buggy_code":"x","tests":"t"}"#,
            "\n",
            r#"{"task_id":"no-code","tests":"t"}"#,
            "\n",
        );
        let (_temp, path) = write(raw);
        assert!(load_dataset(&path, Selection::default()).expect("load").is_empty());
    }

    #[test]
    fn entry_point_stub_keeps_prompt_signature() {
        let prompt = "from typing import List\n\ndef helper(x):\n    return x\n\ndef has_close(nums: List[float], t: float) -> bool:\n    \"\"\"doc\"\"\"\n";
        assert_eq!(
            entry_point_stub("has_close", Some(prompt)),
            "def has_close(nums: List[float], t: float) -> bool:\n    pass\n"
        );
        assert_eq!(
            entry_point_stub("other", Some("def f(a, b):\n")),
            "def f(a, b):\n    pass\n"
        );
    }

    #[test]
    fn entry_point_stub_without_signature() {
        assert_eq!(
            entry_point_stub("solve", None),
            "def solve(*args, **kwargs):\n    pass\n"
        );
        assert_eq!(
            entry_point_stub("solve", Some("no code here")),
            "def solve(*args, **kwargs):\n    pass\n"
        );
    }

    #[test]
    fn record_with_entry_point_gets_stub() {
        let raw = r#"{"task_id":"e","entry_point":"g","prompt":"def g(n):\n","tests":"t"}"#;
        let (_temp, path) = write(raw);
        let tasks = load_dataset(&path, Selection::default()).expect("load");
        assert_eq!(tasks[0].code, "def g(n):\n    pass\n");
    }

    #[test]
    fn seeded_subset_is_deterministic() {
        let raw: String = (0..20)
            .map(|i| format!("{{\"task_id\":\"t{i}\",\"buggy_code\":\"x\",\"tests\":\"t\"}}\n"))
            .collect();
        let (_temp, path) = write(&raw);
        let selection = Selection {
            subset: Some(5),
            seed: Some(42),
        };

        let first = load_dataset(&path, selection).expect("load");
        let second = load_dataset(&path, selection).expect("load");

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn subset_without_seed_keeps_dataset_order() {
        let raw: String = (0..4)
            .map(|i| format!("{{\"task_id\":\"t{i}\",\"buggy_code\":\"x\",\"tests\":\"t\"}}\n"))
            .collect();
        let (_temp, path) = write(&raw);
        let tasks = load_dataset(
            &path,
            Selection {
                subset: Some(2),
                seed: None,
            },
        )
        .expect("load");
        let ids: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_dataset(&temp.path().join("nope.jsonl"), Selection::default()).unwrap_err();
        assert!(err.to_string().contains("dataset not found"));
    }

    #[test]
    fn invalid_json_reports_line() {
        let (_temp, path) = write("{\"task_id\":\"a\"}\nnot json\n");
        let err = load_dataset(&path, Selection::default()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
