//! Load a single task record from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::core::types::Task;

/// Read `{"task_id", "code", "tests"}` from a JSON file.
///
/// Line endings are normalized; a task without tests is rejected.
pub fn load_task(path: &Path) -> Result<Task> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let task: Task =
        serde_json::from_str(&raw).with_context(|| format!("parse task {}", path.display()))?;
    if task.tests.trim().is_empty() {
        bail!("task {} has no tests", task.task_id);
    }
    Ok(Task::new(task.task_id, task.code, task.tests))
}
