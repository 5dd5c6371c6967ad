//! Batch execution of repair episodes over a dataset.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use repair::core::prompt::PromptBuilder;
use repair::core::types::Task;
use repair::io::config::load_config;
use repair::io::episode_log::write_episode;
use repair::io::provider::{CommandProvider, CompletionProvider};
use repair::io::sandbox::{PythonSandbox, Sandbox};
use repair::looping::{EpisodeResult, run_episode};
use repair::tools::ToolRegistry;

use crate::dataset::{Selection, load_dataset};
use crate::results::{BatchMeta, ResultRecord, file_sha256, meta_path, write_meta, write_results};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dataset: PathBuf,
    pub out: PathBuf,
    pub config: PathBuf,
    pub selection: Selection,
    pub jobs: usize,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub results_path: PathBuf,
    pub meta_path: PathBuf,
    pub meta: BatchMeta,
}

/// Shared, read-only inputs of every episode in a batch.
pub struct Batch<'a, P: ?Sized, S: Sandbox> {
    pub max_steps: u32,
    pub provider: &'a P,
    pub tools: &'a ToolRegistry<S>,
    pub prompt: &'a PromptBuilder,
    pub log_dir: Option<&'a Path>,
}

/// Result of one task, plus a failure to write its episode log, if any.
#[derive(Debug)]
pub struct TaskOutcome {
    pub record: ResultRecord,
    pub log_error: Option<String>,
}

/// Run every task in the dataset and persist results and metadata.
#[instrument(skip_all, fields(dataset = %opts.dataset.display(), jobs = opts.jobs))]
pub fn run_batch(opts: &BatchOptions) -> Result<BatchOutcome> {
    let cfg = load_config(&opts.config)?;
    let tasks = load_dataset(&opts.dataset, opts.selection)?;
    let dataset_sha256 = file_sha256(&opts.dataset)?;
    let provider = CommandProvider::from_config(&cfg.provider)?;
    let tools = ToolRegistry::new(
        PythonSandbox::new(cfg.sandbox.python.clone()),
        cfg.sandbox.limits(),
    );
    let prompt = PromptBuilder::new(cfg.tests_head_chars);
    let batch = Batch {
        max_steps: cfg.max_steps,
        provider: &provider,
        tools: &tools,
        prompt: &prompt,
        log_dir: opts.log_dir.as_deref(),
    };

    info!(tasks = tasks.len(), "starting batch");
    let started_at = Utc::now();
    let outcomes = run_tasks(tasks, &batch, opts.jobs)?;
    let finished_at = Utc::now();

    let mut meta = BatchMeta::new(
        &opts.dataset,
        dataset_sha256,
        opts.jobs,
        started_at,
        finished_at,
    );
    let mut records = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if let Some(err) = &outcome.record.error {
            meta.errors
                .push(format!("{}: {err}", outcome.record.episode.task_id));
        }
        if let Some(err) = outcome.log_error {
            meta.errors.push(err);
        }
        records.push(outcome.record);
    }
    meta.tasks = records.len();
    meta.passed = records.iter().filter(|r| r.episode.passed).count();
    if !meta.errors.is_empty() {
        warn!(errors = meta.errors.len(), "batch finished with errors");
    }

    write_results(&opts.out, &records)?;
    let meta_path = meta_path(&opts.out);
    write_meta(&meta_path, &meta)?;
    Ok(BatchOutcome {
        results_path: opts.out.clone(),
        meta_path,
        meta,
    })
}

/// Run `tasks` on a pool of `jobs` worker threads.
///
/// Outcomes come back in task order. An episode that fails with an
/// infrastructure error is recorded as failed instead of aborting the batch.
pub fn run_tasks<P, S>(tasks: Vec<Task>, batch: &Batch<'_, P, S>, jobs: usize) -> Result<Vec<TaskOutcome>>
where
    P: CompletionProvider + Sync + ?Sized,
    S: Sandbox + Sync,
{
    if jobs == 0 {
        bail!("jobs must be > 0");
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("build worker pool")?;

    let total = tasks.len();
    let finished = AtomicUsize::new(0);
    let outcomes = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|task| {
                let outcome = run_one(task, batch);
                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                let record = &outcome.record;
                println!(
                    "[{done}/{total}] {} passed={} steps={}",
                    record.episode.task_id, record.episode.passed, record.episode.steps
                );
                outcome
            })
            .collect()
    });
    Ok(outcomes)
}

fn run_one<P, S>(task: Task, batch: &Batch<'_, P, S>) -> TaskOutcome
where
    P: CompletionProvider + ?Sized,
    S: Sandbox,
{
    let task_id = task.task_id.clone();
    let initial_code = task.code.clone();
    let started = Instant::now();

    match run_episode(
        task,
        batch.max_steps,
        batch.provider,
        batch.tools,
        batch.prompt,
        |_| {},
    ) {
        Ok(episode) => {
            let log_error = batch.log_dir.and_then(|dir| {
                write_episode(dir, &episode)
                    .err()
                    .map(|err| format!("{task_id}: episode log: {err:#}"))
            });
            TaskOutcome {
                record: ResultRecord {
                    episode,
                    error: None,
                },
                log_error,
            }
        }
        Err(err) => {
            warn!(task_id = %task_id, err = %format!("{err:#}"), "episode aborted");
            TaskOutcome {
                record: ResultRecord {
                    episode: EpisodeResult {
                        task_id,
                        passed: false,
                        steps: 0,
                        time_s: (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
                        trace: Vec::new(),
                        transcript: Vec::new(),
                        final_code: initial_code,
                    },
                    error: Some(format!("{err:#}")),
                },
                log_error: None,
            }
        }
    }
}
