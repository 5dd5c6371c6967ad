//! Test-only doubles for the provider and sandbox seams.

use std::collections::VecDeque;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::{Message, Task};
use crate::io::provider::CompletionProvider;
use crate::io::sandbox::{Sandbox, SandboxLimits, SandboxRun};

/// Provider that replays canned completions in order.
///
/// Every request is recorded so tests can inspect the prompt context.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    outputs: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new<I, T>(outputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(|o| Ok(o.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append a provider fault to the script.
    pub fn then_fail(self, message: &str) -> Self {
        lock(&self.outputs).push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.outputs).len()
    }
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        lock(&self.requests).push(messages.to_vec());
        match lock(&self.outputs).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted provider exhausted")),
        }
    }
}

/// Sandbox that replays canned runs and records the code it was given.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    runs: Mutex<VecDeque<SandboxRun>>,
    codes: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(runs: Vec<SandboxRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            codes: Mutex::new(Vec::new()),
        }
    }

    pub fn pass() -> SandboxRun {
        SandboxRun {
            passed: true,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: None,
        }
    }

    pub fn fail(diagnostic: &str) -> SandboxRun {
        SandboxRun {
            passed: false,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: Some(diagnostic.to_string()),
        }
    }

    pub fn executed_codes(&self) -> Vec<String> {
        lock(&self.codes).clone()
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, code: &str, _tests: &str, _limits: &SandboxLimits) -> Result<SandboxRun> {
        lock(&self.codes).push(code.to_string());
        lock(&self.runs)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted sandbox exhausted"))
    }
}

pub fn sandbox_limits() -> SandboxLimits {
    SandboxLimits {
        timeout: Duration::from_secs(3),
        mem_mb: 256,
        output_limit_bytes: 10_000,
    }
}

/// Task whose single test fails until `f` returns 1.
pub fn task(task_id: &str) -> Task {
    Task::new(
        task_id,
        "def f():\n    return 2\n",
        "def test_f():\n    assert f() == 1\n",
    )
}

/// Whether a `python3` interpreter can be spawned.
pub fn python3_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
