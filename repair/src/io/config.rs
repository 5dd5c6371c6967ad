//! Repair configuration stored in `repair.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProcessLimits;
use crate::io::sandbox::SandboxLimits;

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "repair.toml";

/// Repair configuration (TOML).
///
/// Missing fields default to the values used for batch evaluation runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepairConfig {
    /// Directive budget per episode.
    pub max_steps: u32,

    /// Characters of test text shown to the policy each turn.
    pub tests_head_chars: usize,

    pub sandbox: SandboxConfig,

    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used to run candidates.
    pub python: String,

    /// Wall-clock budget per sandbox run, in seconds.
    pub timeout_secs: u64,

    /// Address-space ceiling per sandbox run, in MiB.
    pub mem_mb: u64,

    /// Bytes of candidate stdout/stderr kept per run.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Completion command; receives the request as JSON on stdin and prints the completion.
    pub command: Vec<String>,

    /// Wall-clock budget per completion, in seconds.
    pub timeout_secs: u64,

    pub output_limit_bytes: usize,

    pub max_new_tokens: u32,

    pub temperature: f64,

    /// When set, the last prompt and raw completion are written here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_raw_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 3,
            mem_mb: 256,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
            max_new_tokens: 400,
            temperature: 0.0,
            save_raw_dir: None,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            tests_head_chars: 400,
            sandbox: SandboxConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl RepairConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        self.sandbox.validate()?;
        self.provider.validate()?;
        Ok(())
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.python.trim().is_empty() {
            return Err(anyhow!("sandbox.python must be non-empty"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.mem_mb == 0 {
            return Err(anyhow!("sandbox.mem_mb must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            mem_mb: self.mem_mb,
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("provider.output_limit_bytes must be > 0"));
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return Err(anyhow!("provider.temperature must be >= 0"));
        }
        Ok(())
    }

    /// Fail unless a completion command is configured.
    pub fn require_command(&self) -> Result<&[String]> {
        match self.command.first() {
            Some(program) if !program.trim().is_empty() => Ok(&self.command),
            _ => Err(anyhow!("provider.command must be a non-empty array")),
        }
    }

    pub fn limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RepairConfig::default()`.
pub fn load_config(path: &Path) -> Result<RepairConfig> {
    if !path.exists() {
        let cfg = RepairConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RepairConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RepairConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
