//! # HTTP Server Benchmark Library
//!
//! Benchmarks candidate HTTP server processes: each candidate is launched as
//! an opaque external binary, driven with a fixed number of `GET` requests,
//! and observed by an independent resource sampler while the load runs. The
//! per-candidate measurements are reduced into comparable reports.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `supervisor`: Launch, readiness polling, serving-process resolution and termination
//! - `probe`: Capability interface over the OS process table (`sysinfo` backed)
//! - `monitor`: Cancellable background sampling of CPU, memory and threads
//! - `load`: Serial and bounded-concurrency HTTP load generation
//! - `metrics`: Raw measurements, percentile policy and resource reductions
//! - `results`: Per-candidate reports, cross-candidate comparison and JSON output
//! - `benchmark`: Configuration and the driver that sequences every candidate
//! - `report`: Console rendering
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use http_server_bench::{BenchmarkConfig, BenchmarkDriver, Candidate};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig::new(vec![
//!         Candidate::new("node", "node", vec!["server.js".into()]),
//!         Candidate::new("bun", "bun", vec!["server.ts".into()]),
//!     ]);
//!
//!     let run = BenchmarkDriver::new(config)?.run().await;
//!     for report in &run.reports {
//!         println!("{}: {:.2} req/s", report.name, report.rps());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! Within one candidate run two activities execute at the same time: the
//! resource monitor's periodic sampling task and the load generator's
//! request issuance. They share nothing except the monitor's sample buffer,
//! which is only read after the monitor has been stopped and its task joined.
//! Exactly one candidate process is alive at any time.

/// Benchmark configuration and the per-candidate driver loop
pub mod benchmark;

/// Command-line interface
///
/// Argument parsing using clap, including human-readable durations
/// (e.g., "500ms", "2s", "5m") and the `NAME=COMMAND ARGS` candidate shorthand.
pub mod cli;

/// Candidate declarations and the JSON candidate file
pub mod config;

pub mod error;

/// HTTP load generation
pub mod load;

pub mod logging;

/// Raw measurements and their statistical reductions
///
/// Provides:
/// - Per-request outcomes and per-tick resource samples
/// - Latency summaries with the direct-index percentile convention
/// - Throughput, resource aggregates and efficiency ratios
pub mod metrics;

/// Background resource sampling
pub mod monitor;

/// OS process table access
pub mod probe;

/// Console rendering of reports and comparisons
pub mod report;

/// Result collection, comparison, and output formatting
///
/// Manages per-candidate reports with support for:
/// - Winners by throughput, latency and memory
/// - Speedup framing against a baseline candidate
/// - Structured JSON output with run metadata and system information
pub mod results;

/// Candidate process lifecycle
pub mod supervisor;

pub mod utils;

// Re-export key types for convenient library usage

/// Driver entry points
pub use benchmark::{BenchmarkConfig, BenchmarkDriver, BenchmarkRun};

/// Command-line interface types
pub use cli::Args;

pub use config::Candidate;

pub use error::{BenchError, RequestErrorKind};

pub use load::{LoadConfig, LoadGenerator, LoadMode};

pub use metrics::{RequestOutcome, ResourceSample};

pub use monitor::ResourceMonitor;

/// Result collection and management
pub use results::{AggregateReport, ComparisonTable, ResultsManager};

pub use supervisor::ProcessSupervisor;

/// The current version of the HTTP server benchmark
///
/// Populated from Cargo.toml and recorded in result output for
/// reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These values match the command-line defaults and the `Default`
/// implementations of the configuration types.
pub mod defaults {
    use std::time::Duration;

    /// Host candidates listen on unless declared otherwise
    pub const HOST: &str = "127.0.0.1";

    /// Port candidates listen on unless declared otherwise
    pub const PORT: u16 = 3000;

    /// Default number of measured requests per candidate
    ///
    /// Large enough for stable `p99` values (well above the 50-sample
    /// threshold below which `p99` falls back to the mean).
    pub const REQUESTS: usize = 5000;

    /// Default number of in-flight requests in concurrent mode
    pub const CONCURRENCY: usize = 50;

    /// Default warmup requests
    ///
    /// A handful of discarded requests primes caches and lazy
    /// initialisation in the candidate before measurement begins.
    pub const WARMUP_REQUESTS: usize = 10;

    /// Timeout of one measured request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Readiness probe attempts before a candidate is skipped
    pub const READY_ATTEMPTS: u32 = 20;

    /// Pause between readiness probe attempts
    pub const READY_INTERVAL: Duration = Duration::from_millis(500);

    /// Timeout of one readiness probe
    pub const READY_TIMEOUT: Duration = Duration::from_secs(1);

    /// Time a terminated candidate may take to exit before it is killed
    pub const GRACE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Pause between consecutive candidates
    ///
    /// Gives the previous server's port time to be released.
    pub const COOLDOWN: Duration = Duration::from_secs(2);

    /// Resource sampling period
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

    /// Pause between readiness and measurement
    pub const SETTLE: Duration = Duration::from_secs(1);
}
