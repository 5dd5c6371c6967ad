//! Episode driver: turns until the episode is done or out of budget.

use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::episode::Episode;
use crate::core::prompt::{PromptBuilder, head_chars};
use crate::core::types::{Message, Task};
use crate::io::provider::CompletionProvider;
use crate::io::sandbox::Sandbox;
use crate::step::{TurnOutcome, run_turn};
use crate::tools::ToolRegistry;

/// Characters of the current code kept in each trace entry.
const CODE_HEAD_CHARS: usize = 200;

/// Compact record of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    pub step: u32,
    pub kind: String,
    pub last_assistant: String,
    pub last_tool: Option<String>,
    pub code_head: String,
    pub code_changed: bool,
}

/// Final record of one episode. `time_s` is wall time in seconds, rounded to
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub task_id: String,
    pub passed: bool,
    pub steps: u32,
    pub time_s: f64,
    pub trace: Vec<StepTrace>,
    pub transcript: Vec<Message>,
    pub final_code: String,
}

/// Run one task to completion.
///
/// Stops when the episode is done or `max_steps` turns were processed. An
/// episode still running at that point is closed as failed, so the result
/// always carries a definite verdict. Provider and sandbox infrastructure
/// errors abort the episode and propagate.
#[instrument(skip_all, fields(task_id = %task.task_id, max_steps))]
pub fn run_episode<P, S, F>(
    task: Task,
    max_steps: u32,
    provider: &P,
    tools: &ToolRegistry<S>,
    prompt: &PromptBuilder,
    mut on_turn: F,
) -> Result<EpisodeResult>
where
    P: CompletionProvider + ?Sized,
    S: Sandbox,
    F: FnMut(&TurnOutcome),
{
    let started = Instant::now();
    let mut episode = Episode::new(task, max_steps);
    let mut trace = Vec::new();

    while !episode.is_done() && !episode.budget_exhausted() {
        let outcome = run_turn(&mut episode, provider, tools, prompt)?;
        trace.push(StepTrace {
            step: outcome.step,
            kind: outcome.kind.to_string(),
            last_assistant: outcome.directive_text.clone(),
            last_tool: outcome.last_tool.clone(),
            code_head: head_chars(episode.code(), CODE_HEAD_CHARS).to_string(),
            code_changed: outcome.code_changed,
        });
        on_turn(&outcome);
    }
    if !episode.is_done() {
        episode.finish(false)?;
    }

    let passed = episode.passed().unwrap_or(false);
    let time_s = (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
    info!(passed, steps = episode.step_count(), time_s, "episode finished");

    Ok(EpisodeResult {
        task_id: episode.task_id().to_string(),
        passed,
        steps: episode.step_count(),
        time_s,
        trace,
        transcript: episode.transcript().to_vec(),
        final_code: episode.code().to_string(),
    })
}
