//! Completion provider abstraction.
//!
//! The [`CompletionProvider`] trait decouples the repair loop from the model
//! backend. [`CommandProvider`] spawns a configured command per completion;
//! tests use scripted providers that replay canned outputs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::core::types::Message;
use crate::io::config::ProviderConfig;
use crate::io::process::{ProcessLimits, run_with_timeout};

/// Source of policy text for one turn.
///
/// Errors are provider faults (transport, inference, timeout) and propagate to
/// the caller of the repair loop.
pub trait CompletionProvider {
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// JSON document written to the completion command's stdin.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [Message],
    max_new_tokens: u32,
    temperature: f64,
}

/// Provider that runs an external command per completion.
///
/// The command reads a JSON request (`messages`, `max_new_tokens`,
/// `temperature`) on stdin and prints the completion text on stdout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    limits: ProcessLimits,
    max_new_tokens: u32,
    temperature: f64,
    save_raw_dir: Option<PathBuf>,
}

impl CommandProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let command = cfg.require_command()?;
        Ok(Self {
            program: command[0].clone(),
            args: command[1..].to_vec(),
            limits: cfg.limits(),
            max_new_tokens: cfg.max_new_tokens,
            temperature: cfg.temperature,
            save_raw_dir: cfg.save_raw_dir.clone(),
        })
    }
}

impl CompletionProvider for CommandProvider {
    #[instrument(skip_all, fields(program = %self.program, messages = messages.len()))]
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = CompletionRequest {
            messages,
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };
        let payload = serde_json::to_vec(&request).context("serialize completion request")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        let output = run_with_timeout(cmd, Some(payload.clone()), &self.limits)
            .context("run completion command")?;

        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "completion timed out");
            return Err(anyhow!(
                "completion command timed out after {:?}",
                self.limits.timeout
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!(raw = %text, "raw completion");
        debug!(bytes = text.len(), "completion received");

        if let Some(dir) = &self.save_raw_dir {
            save_raw(dir, &payload, &text)?;
        }
        Ok(text)
    }
}

/// Keep the most recent prompt and raw completion for inspection.
fn save_raw(dir: &Path, prompt: &[u8], raw: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create raw dir {}", dir.display()))?;
    let prompt_path = dir.join("last_prompt.json");
    fs::write(&prompt_path, prompt).with_context(|| format!("write {}", prompt_path.display()))?;
    let raw_path = dir.join("last_raw.txt");
    fs::write(&raw_path, raw).with_context(|| format!("write {}", raw_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn provider(script: &str, timeout_secs: u64) -> CommandProvider {
        CommandProvider::from_config(&ProviderConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
            ..ProviderConfig::default()
        })
        .expect("provider")
    }

    fn messages() -> Vec<Message> {
        vec![
            Message::new(Role::System, "be terse"),
            Message::new(Role::User, "CODE:\nx = 1"),
        ]
    }

    #[test]
    fn returns_command_stdout() {
        let provider = provider("cat >/dev/null; printf 'TOOL: run_python'", 5);
        let text = provider.complete(&messages()).expect("complete");
        assert_eq!(text, "TOOL: run_python");
    }

    #[test]
    fn forwards_messages_and_decoding_settings_as_json() {
        let provider = provider("cat", 5);
        let text = provider.complete(&messages()).expect("complete");
        let request: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][1]["content"], "CODE:\nx = 1");
        assert_eq!(request["max_new_tokens"], 400);
    }

    #[test]
    fn timeout_is_a_provider_fault() {
        let provider = provider("exec sleep 10", 1);
        let err = provider.complete(&messages()).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn non_zero_exit_is_a_provider_fault() {
        let provider = provider("cat >/dev/null; echo overloaded >&2; exit 3", 5);
        let err = provider.complete(&messages()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Some(3)"));
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn saves_last_prompt_and_raw_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut provider = provider("cat >/dev/null; printf 'FINAL_ANSWER: TESTS_PASS'", 5);
        provider.save_raw_dir = Some(temp.path().join("raw"));
        provider.complete(&messages()).expect("complete");

        let raw = fs::read_to_string(temp.path().join("raw/last_raw.txt")).expect("raw");
        assert_eq!(raw, "FINAL_ANSWER: TESTS_PASS");
        assert!(temp.path().join("raw/last_prompt.json").is_file());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = CommandProvider::from_config(&ProviderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("provider.command"));
    }
}
