//! # HTTP Server Benchmark - Main Entry Point
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: Processes command-line configuration
//! 2. **Initialize logging**: Coloured console output, optional log file
//! 3. **Create benchmark config**: Loads candidates and validates settings
//! 4. **Run benchmarks**: Executes every candidate in order, skipping failures
//! 5. **Report**: Prints per-candidate details and the comparison summary,
//!    and writes JSON results when an output file is given
//!
//! A candidate that fails to launch or never becomes ready is reported as
//! skipped; the process exits non-zero only when no candidate produced a
//! report or when configuration or output handling fails.

use anyhow::Result;
use clap::Parser;
use http_server_bench::{
    benchmark::{BenchmarkConfig, BenchmarkDriver},
    cli::Args,
    logging, report,
    results::ResultsManager,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the file writer flushes.
    let _log_guard = logging::init(args.log_level(), args.log_file.as_deref())?;

    info!("Starting HTTP Server Benchmark v{}", http_server_bench::VERSION);

    let config = BenchmarkConfig::from_args(&args)?;
    info!(
        "{} candidate(s), baseline '{}'",
        config.candidates.len(),
        config.baseline
    );

    // Created up front so an unwritable output path fails before any server runs.
    let results_manager = match &args.output_file {
        Some(path) => Some(ResultsManager::new(path)?),
        None => None,
    };

    let driver = BenchmarkDriver::new(config)?;
    let run = driver.run().await;

    println!();
    for r in &run.reports {
        println!("{}", report::render_candidate(r));
    }
    print!("{}", report::render_summary(&run));

    if let Some(manager) = &results_manager {
        manager.finalize(&run, &driver.config().load)?;
    }

    if run.reports.is_empty() {
        error!("No candidate produced results");
        anyhow::bail!("all {} candidate(s) were skipped", run.skipped.len());
    }

    info!("HTTP Server Benchmark completed successfully");
    Ok(())
}
