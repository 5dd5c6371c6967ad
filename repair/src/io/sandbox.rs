//! Sandboxed execution of candidate code against its tests.
//!
//! Every run gets a fresh interpreter process in a fresh temporary directory.
//! The embedded harness caps its own address space before touching untrusted
//! code and reports the verdict through a result file in a second temporary
//! directory. Its path reaches the harness over stdin, so neither output
//! printed by the candidate nor files it writes next to itself can be mistaken
//! for a verdict. The deadline is enforced by killing the process group.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{ProcessLimits, ProcessOutput, run_with_timeout};

const HARNESS: &str = include_str!("harness.py");
const HARNESS_FILE: &str = "harness.py";
const CODE_FILE: &str = "candidate.py";
const TESTS_FILE: &str = "tests.py";
const VERDICT_FILE: &str = "verdict.json";

/// Diagnostic reported when a run exceeds its wall-clock budget.
pub const TIMEOUT_DIAGNOSTIC: &str = "TIMEOUT";

/// Per-invocation resource budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    /// Address-space ceiling applied inside the child, in MiB.
    pub mem_mb: u64,
    pub output_limit_bytes: usize,
}

/// Outcome of one sandbox run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxRun {
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    /// `"<fault kind>: <message>"`, `"TIMEOUT"`, or `None` on success.
    pub diagnostic: Option<String>,
}

/// Executes a program plus its tests in isolation.
///
/// Implementations must not retain state between calls. Runtime faults in the
/// candidate are reported in [`SandboxRun`]; `Err` is reserved for failures of
/// the sandbox itself (interpreter missing, temp dir not writable).
pub trait Sandbox {
    fn execute(&self, code: &str, tests: &str, limits: &SandboxLimits) -> Result<SandboxRun>;
}

/// Sandbox backed by a child Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
}

/// Verdict written by the harness.
#[derive(Debug, Deserialize)]
struct HarnessVerdict {
    passed: bool,
    diagnostic: Option<String>,
}

impl PythonSandbox {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Sandbox for PythonSandbox {
    #[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64, mem_mb = limits.mem_mb))]
    fn execute(&self, code: &str, tests: &str, limits: &SandboxLimits) -> Result<SandboxRun> {
        let dir = tempfile::Builder::new()
            .prefix("repair-sandbox-")
            .tempdir()
            .context("create sandbox dir")?;
        write_file(dir.path(), HARNESS_FILE, HARNESS)?;
        write_file(dir.path(), CODE_FILE, code)?;
        write_file(dir.path(), TESTS_FILE, tests)?;
        let verdict_dir = tempfile::tempdir().context("create verdict dir")?;
        let verdict_path = verdict_dir.path().join(VERDICT_FILE);

        let mut cmd = Command::new(&self.python);
        // -I: ignore environment and user site-packages; -B: no bytecode files.
        cmd.arg("-I")
            .arg("-B")
            .arg(HARNESS_FILE)
            .arg(CODE_FILE)
            .arg(TESTS_FILE)
            .arg(limits.mem_mb.to_string())
            .current_dir(dir.path());

        let output = run_with_timeout(
            cmd,
            Some(format!("{}\n", verdict_path.display()).into_bytes()),
            &ProcessLimits {
                timeout: limits.timeout,
                output_limit_bytes: limits.output_limit_bytes,
            },
        )
        .with_context(|| format!("run sandbox interpreter {}", self.python))?;

        let run = interpret(&output, &verdict_path);
        info!(
            passed = run.passed,
            diagnostic = run.diagnostic.as_deref().unwrap_or(""),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "sandbox run finished"
        );
        Ok(run)
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

fn interpret(output: &ProcessOutput, verdict_path: &Path) -> SandboxRun {
    let stdout = output.stdout_text();
    let stderr = output.stderr_text();

    if output.timed_out {
        warn!("sandbox run timed out");
        return SandboxRun {
            passed: false,
            stdout,
            stderr,
            diagnostic: Some(TIMEOUT_DIAGNOSTIC.to_string()),
        };
    }

    match read_verdict(verdict_path) {
        Some(verdict) => SandboxRun {
            passed: verdict.passed,
            stdout,
            stderr,
            diagnostic: if verdict.passed {
                None
            } else {
                Some(verdict.diagnostic.unwrap_or_default())
            },
        },
        None => {
            let reason = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("exit status {:?}", output.status.code()));
            warn!(%reason, "sandbox exited without a verdict");
            SandboxRun {
                passed: false,
                stdout,
                stderr,
                diagnostic: Some(format!("SandboxCrash: {reason}")),
            }
        }
    }
}

fn read_verdict(path: &Path) -> Option<HarnessVerdict> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(err = %err, "no verdict file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(verdict) => Some(verdict),
        Err(err) => {
            debug!(err = %err, "unreadable verdict file");
            None
        }
    }
}
