//! LLM-driven iterative code repair.
//!
//! Runs one repair episode for a task, executes a candidate once in the
//! sandbox, or shows how a model output would be parsed.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use repair::core::directive::parse_directive;
use repair::core::prompt::PromptBuilder;
use repair::exit_codes;
use repair::io::config::{DEFAULT_CONFIG_FILE, RepairConfig, load_config, write_config};
use repair::io::episode_log::write_episode;
use repair::io::provider::CommandProvider;
use repair::io::sandbox::{PythonSandbox, Sandbox};
use repair::io::task::load_task;
use repair::logging;
use repair::looping::run_episode;
use repair::tools::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "repair",
    version,
    about = "Iterative code repair driven by a language-model policy"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `repair.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run one repair episode and print its result as JSON.
    Run {
        /// Task file with `task_id`, `code` and `tests`.
        #[arg(long)]
        task: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Write result, transcript and final code under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Run a program against its tests once in the sandbox.
    Exec {
        #[arg(long)]
        code: PathBuf,
        #[arg(long)]
        tests: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Print the directive chosen from model output read on stdin.
    Parse,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run {
            task,
            config,
            log_dir,
        } => cmd_run(&task, &config, log_dir.as_deref()),
        Command::Exec {
            code,
            tests,
            config,
        } => cmd_exec(&code, &tests, &config),
        Command::Parse => cmd_parse(),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &RepairConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(task_path: &Path, config_path: &Path, log_dir: Option<&Path>) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let task = load_task(task_path)?;
    let provider = CommandProvider::from_config(&cfg.provider)?;
    let tools = ToolRegistry::new(
        PythonSandbox::new(cfg.sandbox.python.clone()),
        cfg.sandbox.limits(),
    );
    let prompt = PromptBuilder::new(cfg.tests_head_chars);

    let result = run_episode(task, cfg.max_steps, &provider, &tools, &prompt, |turn| {
        info!(step = turn.step, kind = turn.kind, status = ?turn.status, "turn");
    })?;

    if let Some(dir) = log_dir {
        let paths = write_episode(dir, &result)?;
        info!(dir = %paths.dir.display(), "episode log written");
    }
    print_json(&result)?;
    Ok(verdict_code(result.passed))
}

fn cmd_exec(code_path: &Path, tests_path: &Path, config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let code = fs::read_to_string(code_path)
        .with_context(|| format!("read {}", code_path.display()))?;
    let tests = fs::read_to_string(tests_path)
        .with_context(|| format!("read {}", tests_path.display()))?;

    let sandbox = PythonSandbox::new(cfg.sandbox.python.clone());
    let run = sandbox.execute(&code, &tests, &cfg.sandbox.limits())?;
    print_json(&run)?;
    Ok(verdict_code(run.passed))
}

fn cmd_parse() -> Result<i32> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("read model output from stdin")?;
    println!("{}", parse_directive(&raw).text);
    Ok(exit_codes::OK)
}

fn verdict_code(passed: bool) -> i32 {
    if passed {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
