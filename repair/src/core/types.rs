//! Shared deterministic types for the repair core.
//!
//! These types define the contracts between the directive parser, the tool
//! registry and the episode state machine. They carry no I/O.

use serde::{Deserialize, Serialize};

/// First line of every failed test-run observation.
pub const TESTS_FAIL_MARKER: &str = "TESTS_FAIL";
/// Rendered form of a passing test-run observation.
pub const TESTS_PASS_MARKER: &str = "TESTS_PASS";

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Names of the tools a directive may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    RunPython,
    InspectTraceback,
    SetCode,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::RunPython,
        ToolName::InspectTraceback,
        ToolName::SetCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::RunPython => "run_python",
            ToolName::InspectTraceback => "inspect_traceback",
            ToolName::SetCode => "set_code",
        }
    }
}

/// The single action chosen by the policy for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    RunTests,
    InspectFailure,
    ReplaceCode { body: String },
    FinalAnswer { status: String },
    /// A directive-shaped span that matches none of the accepted forms.
    Malformed { text: String },
}

impl Directive {
    /// Stable label used in logs and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::RunTests => "run_tests",
            Directive::InspectFailure => "inspect_failure",
            Directive::ReplaceCode { .. } => "replace_code",
            Directive::FinalAnswer { .. } => "final_answer",
            Directive::Malformed { .. } => "malformed",
        }
    }
}

/// Normalized result of executing a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    TestsPass,
    TestsFail { diagnostic: String },
    Info { text: String },
    Ack { text: String },
}

impl Observation {
    /// Text appended to the transcript as a `tool` message.
    pub fn render(&self) -> String {
        match self {
            Observation::TestsPass => TESTS_PASS_MARKER.to_string(),
            Observation::TestsFail { diagnostic } => {
                format!("{TESTS_FAIL_MARKER}\n{}", diagnostic.trim())
            }
            Observation::Info { text } | Observation::Ack { text } => text.clone(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Observation::TestsPass)
    }
}

/// A task record: the buggy program and the tests it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub code: String,
    pub tests: String,
}

impl Task {
    /// Build a task with CRLF line endings normalized to LF.
    pub fn new(
        task_id: impl Into<String>,
        code: impl AsRef<str>,
        tests: impl AsRef<str>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            code: normalize_newlines(code.as_ref()),
            tests: normalize_newlines(tests.as_ref()),
        }
    }
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_observation_renders_marker_then_trimmed_diagnostic() {
        let obs = Observation::TestsFail {
            diagnostic: "  AssertionError: \n".to_string(),
        };
        assert_eq!(obs.render(), "TESTS_FAIL\nAssertionError:");
    }

    #[test]
    fn fail_observation_with_empty_diagnostic_keeps_marker_line() {
        let obs = Observation::TestsFail {
            diagnostic: String::new(),
        };
        assert_eq!(obs.render(), "TESTS_FAIL\n");
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = Message::new(Role::Assistant, "TOOL: run_python");
        let json = serde_json::to_string(&msg).expect("serialize");
        assert_eq!(json, r#"{"role":"assistant","content":"TOOL: run_python"}"#);
    }

    #[test]
    fn task_normalizes_crlf() {
        let task = Task::new("t", "a\r\nb", "c\r\n");
        assert_eq!(task.code, "a\nb");
        assert_eq!(task.tests, "c\n");
    }
}
