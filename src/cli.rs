use crate::{config::Candidate, load::LoadMode};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP Server Benchmark - launch candidate servers, load them and compare
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON file declaring the candidates to benchmark
    #[clap(long, help_heading = "Candidates")]
    pub candidates: Option<PathBuf>,

    /// Candidate shorthand NAME=COMMAND [ARGS...] (repeatable)
    #[clap(long, value_parser = parse_candidate, help_heading = "Candidates")]
    pub candidate: Vec<Candidate>,

    /// Candidate that speedups are expressed against (default: the first one)
    #[clap(long, help_heading = "Candidates")]
    pub baseline: Option<String>,

    /// Number of measured requests per candidate
    #[clap(short = 'n', long, default_value_t = crate::defaults::REQUESTS, help_heading = "Load")]
    pub requests: usize,

    /// Maximum requests in flight in concurrent mode
    #[clap(
        short = 'c',
        long,
        default_value_t = crate::defaults::CONCURRENCY,
        help_heading = "Load"
    )]
    pub concurrency: usize,

    /// Request scheduling
    #[clap(long, value_enum, default_value_t = LoadMode::Concurrent, help_heading = "Load")]
    pub mode: LoadMode,

    /// Unmeasured requests sent before measurement starts
    #[clap(
        short = 'w',
        long,
        default_value_t = crate::defaults::WARMUP_REQUESTS,
        help_heading = "Load"
    )]
    pub warmup: usize,

    /// Timeout of a single measured request
    #[clap(long, value_parser = parse_duration, default_value = "5s", help_heading = "Load")]
    pub request_timeout: Duration,

    /// Log a progress line every 10% of requests
    #[clap(long, default_value_t = false, help_heading = "Load")]
    pub progress: bool,

    /// Readiness probe attempts before a candidate is skipped
    #[clap(long, default_value_t = crate::defaults::READY_ATTEMPTS, help_heading = "Lifecycle")]
    pub ready_attempts: u32,

    /// Pause between readiness probe attempts
    #[clap(
        long,
        value_parser = parse_duration,
        default_value = "500ms",
        help_heading = "Lifecycle"
    )]
    pub ready_interval: Duration,

    /// Timeout of a single readiness probe
    #[clap(long, value_parser = parse_duration, default_value = "1s", help_heading = "Lifecycle")]
    pub ready_timeout: Duration,

    /// Time a terminated server may take to exit before it is killed
    #[clap(long, value_parser = parse_duration, default_value = "5s", help_heading = "Lifecycle")]
    pub grace_timeout: Duration,

    /// Pause between consecutive candidates
    #[clap(long, value_parser = parse_duration, default_value = "2s", help_heading = "Lifecycle")]
    pub cooldown: Duration,

    /// Pause between readiness and measurement
    #[clap(long, value_parser = parse_duration, default_value = "1s", help_heading = "Lifecycle")]
    pub settle: Duration,

    /// Resource sampling period
    #[clap(
        long,
        value_parser = parse_duration,
        default_value = "500ms",
        help_heading = "Lifecycle"
    )]
    pub sample_interval: Duration,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Also write an uncoloured log to this file
    #[clap(long, help_heading = "Output")]
    pub log_file: Option<PathBuf>,

    /// Verbose output (debug level)
    #[clap(
        short = 'v',
        long,
        default_value_t = false,
        conflicts_with = "quiet",
        help_heading = "Output"
    )]
    pub verbose: bool,

    /// Only log warnings and errors
    #[clap(short = 'q', long, default_value_t = false, help_heading = "Output")]
    pub quiet: bool,
}

impl Args {
    /// Default log directive implied by `-v` / `-q`, overridden by `RUST_LOG`.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

fn parse_candidate(s: &str) -> Result<Candidate, String> {
    Candidate::parse_shorthand(s).map_err(|e| e.to_string())
}

/// Parse duration from string (e.g., "10s", "5m", "1h", "500ms")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}
