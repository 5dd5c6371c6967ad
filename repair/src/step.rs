//! Orchestration for a single policy turn.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::directive::{DEFAULT_DIRECTIVE, parse_directive};
use crate::core::episode::{Episode, EpisodeStatus};
use crate::core::prompt::PromptBuilder;
use crate::core::types::{Directive, Observation, Role};
use crate::io::provider::CompletionProvider;
use crate::io::sandbox::Sandbox;
use crate::tools::ToolRegistry;

/// Status phrases that make a final answer count as a pass.
pub const ACCEPTED_PASS_PHRASES: [&str; 2] = ["All tests pass", "TESTS_PASS"];

/// Result of one processed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Step number just processed (1-indexed).
    pub step: u32,
    /// Directive label, see [`Directive::kind`].
    pub kind: &'static str,
    /// Directive text appended as the assistant message.
    pub directive_text: String,
    /// Last tool message appended this turn, if any.
    pub last_tool: Option<String>,
    pub code_changed: bool,
    pub status: EpisodeStatus,
}

/// Process exactly one directive.
///
/// Builds the prompt context, asks the provider for one completion, parses
/// it, records it and dispatches it. `step_count` grows by one per processed
/// directive whichever branch runs. Provider and sandbox infrastructure errors
/// propagate and leave the step count untouched; every other outcome is
/// recorded in the episode.
#[instrument(skip_all, fields(task_id = %episode.task_id(), step = episode.step_count() + 1))]
pub fn run_turn<P, S>(
    episode: &mut Episode,
    provider: &P,
    tools: &ToolRegistry<S>,
    prompt: &PromptBuilder,
) -> Result<TurnOutcome>
where
    P: CompletionProvider + ?Sized,
    S: Sandbox,
{
    episode.ensure_can_step()?;

    let messages = prompt.build(episode)?;
    let raw = provider
        .complete(&messages)
        .context("completion provider failed")?;
    let parsed = parse_directive(&raw);
    let kind = parsed.directive.kind();
    debug!(kind, text = %parsed.text, "parsed directive");

    episode.push(Role::Assistant, parsed.text.clone())?;
    let last_turn = episode.step_count() + 1 >= episode.max_steps();

    let mut last_tool = None;
    let mut code_changed = false;
    let verdict = match parsed.directive {
        Directive::FinalAnswer { status } => {
            let passed = ACCEPTED_PASS_PHRASES
                .iter()
                .any(|phrase| status.contains(phrase));
            info!(passed, status = %status, "final answer");
            Some(passed)
        }
        Directive::ReplaceCode { body } => {
            let ack = tools.set_code(&body);
            episode.push(Role::Tool, ack.render())?;
            code_changed = body != episode.code();
            episode.replace_code(body)?;
            episode.push(Role::Assistant, DEFAULT_DIRECTIVE)?;
            let obs = run_tests(episode, tools)?;
            last_tool = Some(obs.render());
            settle(&obs, last_turn)
        }
        Directive::RunTests => {
            let obs = run_tests(episode, tools)?;
            last_tool = Some(obs.render());
            settle(&obs, last_turn)
        }
        Directive::InspectFailure => {
            let diagnostic = episode.last_failure_diagnostic().to_string();
            let obs = tools.inspect_traceback(&diagnostic);
            let text = obs.render();
            episode.push(Role::Tool, text.clone())?;
            last_tool = Some(text);
            None
        }
        Directive::Malformed { text } => {
            warn!(text = %text, "unrecognized directive, ending episode");
            Some(false)
        }
    };

    episode.advance_step()?;
    if let Some(passed) = verdict {
        episode.finish(passed)?;
    }

    Ok(TurnOutcome {
        step: episode.step_count(),
        kind,
        directive_text: parsed.text,
        last_tool,
        code_changed,
        status: episode.status(),
    })
}

fn run_tests<S: Sandbox>(episode: &mut Episode, tools: &ToolRegistry<S>) -> Result<Observation> {
    let obs = tools
        .run_python(episode.code(), episode.tests())
        .context("sandbox failed")?;
    episode.push(Role::Tool, obs.render())?;
    Ok(obs)
}

/// Verdict after a test run: pass ends the episode, a failure on the last
/// budgeted turn ends it as failed, anything else keeps it running.
fn settle(obs: &Observation, last_turn: bool) -> Option<bool> {
    if obs.is_pass() {
        Some(true)
    } else if last_turn {
        Some(false)
    } else {
        None
    }
}
