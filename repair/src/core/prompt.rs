//! Prompt context assembly for one policy turn.
//!
//! Every turn sends the system instructions, the full transcript in insertion
//! order, and a fresh user turn with the current code and a bounded head of the
//! tests. Nothing else is carried between turns.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::episode::Episode;
use crate::core::types::{Message, Role, ToolName};

const SYSTEM_TEMPLATE: &str = include_str!("../prompts/system.md");
const CONTEXT_TEMPLATE: &str = include_str!("../prompts/context.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("context", CONTEXT_TEMPLATE)
            .expect("context template should be valid");
        Self { env }
    }

    fn render_system(&self) -> Result<String> {
        let tools: Vec<&str> = ToolName::ALL.iter().map(|tool| tool.as_str()).collect();
        let template = self.env.get_template("system")?;
        Ok(template.render(context! { tools => tools })?)
    }

    fn render_context(&self, code: &str, tests_head: &str) -> Result<String> {
        let template = self.env.get_template("context")?;
        Ok(template.render(context! {
            code => code,
            tests_head => tests_head,
        })?)
    }
}

/// Builds the message sequence sent to the completion provider.
pub struct PromptBuilder {
    tests_head_chars: usize,
    engine: PromptEngine,
}

impl PromptBuilder {
    pub fn new(tests_head_chars: usize) -> Self {
        Self {
            tests_head_chars,
            engine: PromptEngine::new(),
        }
    }

    pub fn system_prompt(&self) -> Result<String> {
        self.engine.render_system().context("render system prompt")
    }

    /// System instructions, then the transcript verbatim, then the current state.
    pub fn build(&self, episode: &Episode) -> Result<Vec<Message>> {
        let tests_head = head_chars(episode.tests(), self.tests_head_chars);
        let user_turn = self
            .engine
            .render_context(episode.code(), tests_head)
            .context("render context turn")?;

        let mut messages = Vec::with_capacity(episode.transcript().len() + 2);
        messages.push(Message::new(Role::System, self.system_prompt()?));
        messages.extend(episode.transcript().iter().cloned());
        messages.push(Message::new(Role::User, user_turn));
        debug!(
            messages = messages.len(),
            tests_head_chars = tests_head.chars().count(),
            "built prompt context"
        );
        Ok(messages)
    }
}

/// Longest prefix of `text` holding at most `limit` characters.
pub fn head_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
