//! CLI command implementations.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::report::aggregate;
use crate::run::{BatchOptions, run_batch};

/// Run a batch and print where the results went.
pub fn run(opts: &BatchOptions) -> Result<()> {
    debug!(?opts, "batch options");
    let outcome = run_batch(opts)?;
    println!(
        "run: tasks={} passed={} errors={}",
        outcome.meta.tasks,
        outcome.meta.passed,
        outcome.meta.errors.len()
    );
    println!(
        "run: results={} meta={}",
        outcome.results_path.display(),
        outcome.meta_path.display()
    );
    Ok(())
}

/// Print pass@1 and averages for a results file.
pub fn report(results: &Path) -> Result<()> {
    let (summary, warnings) = aggregate(results)?;
    println!(
        "report: n={} passed={} pass@1={:.4}",
        summary.n, summary.passed, summary.pass_at_1
    );
    if let Some(avg) = summary.avg_steps {
        println!("report: avg_steps={:.2}", avg);
    }
    if let Some(avg) = summary.avg_time_s {
        println!("report: avg_time_s={:.3}", avg);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
