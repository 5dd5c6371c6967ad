//! Mutable record of one repair attempt.
//!
//! The transcript is the policy's only memory: it is append-only and replayed
//! verbatim into every prompt. All mutation goes through methods that refuse to
//! touch a finished episode.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::types::{Message, Role, TESTS_FAIL_MARKER, Task};

/// Lifecycle of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EpisodeStatus {
    Running,
    Done { passed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    task_id: String,
    code: String,
    tests: String,
    transcript: Vec<Message>,
    step_count: u32,
    max_steps: u32,
    status: EpisodeStatus,
}

impl Episode {
    pub fn new(task: Task, max_steps: u32) -> Self {
        Self {
            task_id: task.task_id,
            code: task.code,
            tests: task.tests,
            transcript: Vec::new(),
            step_count: 0,
            max_steps,
            status: EpisodeStatus::Running,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn tests(&self) -> &str {
        &self.tests
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, EpisodeStatus::Done { .. })
    }

    /// Tri-state verdict: `None` while running.
    pub fn passed(&self) -> Option<bool> {
        match self.status {
            EpisodeStatus::Running => None,
            EpisodeStatus::Done { passed } => Some(passed),
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.step_count >= self.max_steps
    }

    /// Fail unless another turn may be processed.
    pub fn ensure_can_step(&self) -> Result<()> {
        if self.is_done() {
            bail!("episode {} is already finished", self.task_id);
        }
        if self.budget_exhausted() {
            bail!(
                "episode {} exhausted its step budget ({}/{})",
                self.task_id,
                self.step_count,
                self.max_steps
            );
        }
        Ok(())
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.transcript.push(Message::new(role, content));
        Ok(())
    }

    pub fn replace_code(&mut self, code: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.code = code.into();
        Ok(())
    }

    pub fn advance_step(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.step_count += 1;
        Ok(())
    }

    pub fn finish(&mut self, passed: bool) -> Result<()> {
        self.ensure_mutable()?;
        self.status = EpisodeStatus::Done { passed };
        Ok(())
    }

    /// Diagnostic body of the most recent failed test run, or `""` when none.
    ///
    /// Everything after the marker line of the newest `tool` message that starts
    /// with the failure marker.
    pub fn last_failure_diagnostic(&self) -> &str {
        self.transcript
            .iter()
            .rev()
            .find(|msg| msg.role == Role::Tool && msg.content.starts_with(TESTS_FAIL_MARKER))
            .and_then(|msg| msg.content.split_once('\n'))
            .map_or("", |(_, rest)| rest)
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_done() {
            bail!("episode {} is finished and can no longer change", self.task_id);
        }
        Ok(())
    }
}
