//! Tool registry: the three operations a directive can invoke.

use anyhow::Result;
use tracing::debug;

use crate::core::types::Observation;
use crate::io::sandbox::{Sandbox, SandboxLimits};

pub const NO_TRACEBACK: &str = "No traceback provided.";
pub const CODE_REPLACED: &str = "Replaced entire file with new candidate code.";

/// Tools bound to one sandbox and one per-invocation budget.
#[derive(Debug, Clone)]
pub struct ToolRegistry<S: Sandbox> {
    sandbox: S,
    limits: SandboxLimits,
}

impl<S: Sandbox> ToolRegistry<S> {
    pub fn new(sandbox: S, limits: SandboxLimits) -> Self {
        Self { sandbox, limits }
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Run the tests against `code`.
    ///
    /// Candidate faults come back as `TestsFail`; only sandbox infrastructure
    /// failures are errors.
    pub fn run_python(&self, code: &str, tests: &str) -> Result<Observation> {
        let run = self.sandbox.execute(code, tests, &self.limits)?;
        if run.passed {
            return Ok(Observation::TestsPass);
        }
        Ok(Observation::TestsFail {
            diagnostic: run.diagnostic.unwrap_or_default(),
        })
    }

    pub fn inspect_traceback(&self, text: &str) -> Observation {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Observation::Info {
                text: NO_TRACEBACK.to_string(),
            };
        }
        let first = trimmed.lines().next().unwrap_or_default();
        debug!(first_line = first, "inspected traceback");
        Observation::Info {
            text: format!("Likely cause: {first}"),
        }
    }

    /// Acknowledge a wholesale replacement. The caller swaps the code.
    pub fn set_code(&self, new_code: &str) -> Observation {
        debug!(bytes = new_code.len(), "set_code");
        Observation::Ack {
            text: CODE_REPLACED.to_string(),
        }
    }
}
