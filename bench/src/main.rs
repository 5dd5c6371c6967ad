mod cli;
mod dataset;
mod report;
mod results;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use repair::exit_codes;
use repair::io::config::DEFAULT_CONFIG_FILE;

use crate::dataset::Selection;
use crate::run::BatchOptions;

#[derive(Parser)]
#[command(name = "bench", version, about = "Batch evaluation harness for repair")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every dataset task as a repair episode.
    Run {
        /// JSONL dataset (HumanEvalFix-style records).
        #[arg(long)]
        dataset: PathBuf,
        /// Results file, one JSON result per line.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Keep only the first N tasks.
        #[arg(long)]
        subset: Option<usize>,
        /// Shuffle tasks with this seed before taking the subset.
        #[arg(long)]
        seed: Option<u64>,
        /// Episodes run in parallel.
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Write per-episode logs under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Score a results file.
    Report {
        #[arg(long)]
        results: PathBuf,
    },
}

fn main() {
    repair::logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            dataset,
            out,
            config,
            subset,
            seed,
            jobs,
            log_dir,
        } => cli::run(&BatchOptions {
            dataset,
            out,
            config,
            selection: Selection { subset, seed },
            jobs,
            log_dir,
        }),
        Command::Report { results } => cli::report(&results),
    };
    if let Err(err) = result {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}
