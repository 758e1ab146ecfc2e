//! # Benchmark Driver
//!
//! Sequences the per-candidate lifecycle across a declared, ordered list of
//! candidates and collects one [`AggregateReport`] per successful candidate.
//!
//! ## Candidate Lifecycle
//!
//! 1. **Launch**: spawn the candidate's command
//! 2. **Readiness**: poll the target URL until it answers 200
//! 3. **Settle & Attach**: short pause, then resolve the serving process and
//!    read its initial memory
//! 4. **Measure**: resource monitor sampling in the background while the load
//!    generator drives requests in the foreground
//! 5. **Teardown**: stop the monitor, then stop the process
//! 6. **Reduce**: build the candidate's report
//!
//! Any failure in steps 1 to 4 aborts only that candidate. Its process is
//! still stopped, and the candidate is recorded as skipped with the failure
//! reason. A cooldown separates consecutive candidates so a port released by
//! one server is free again before the next one binds it.

use crate::{
    cli::Args,
    config::{validate_candidates, Candidate, CandidateFile},
    defaults,
    error::{readiness_timeout, BenchError},
    load::{LoadConfig, LoadGenerator, LoadMode, LoadRun},
    metrics::ResourceSample,
    monitor::ResourceMonitor,
    probe::{ProcessProbe, SysinfoProbe},
    results::{compare, AggregateReport, ComparisonTable, SkippedCandidate},
    supervisor::{OsProcessRef, ProcessHandle, ProcessSupervisor},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

/// One-line-per-setting banner printed before each candidate.
struct CandidateDisplay<'a> {
    candidate: &'a Candidate,
    load: &'a LoadConfig,
}

impl<'a> std::fmt::Display for CandidateDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schedule = match self.load.mode {
            LoadMode::Concurrent => format!("concurrent, {} in flight", self.load.concurrency),
            LoadMode::Serial => "serial".to_string(),
        };

        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark for: {}", self.candidate.name)?;
        writeln!(f, "  Command:            {}", self.candidate.command_line())?;
        writeln!(f, "  Target URL:         {}", self.candidate.url())?;
        writeln!(
            f,
            "  Process Pattern:    {}",
            self.candidate.process_pattern()
        )?;
        writeln!(
            f,
            "  Requests:           {} ({})",
            self.load.total_requests, schedule
        )?;
        writeln!(f, "  Warmup Requests:    {}", self.load.warmup_requests)?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Everything that controls one driver invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Candidates in execution order
    pub candidates: Vec<Candidate>,

    /// Name of the candidate speedups are expressed against
    pub baseline: String,

    pub load: LoadConfig,

    /// Readiness probe attempts before the candidate is skipped
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    /// Timeout of a single readiness probe
    pub ready_timeout: Duration,

    /// How long a terminated process may take to exit before it is killed
    pub grace_timeout: Duration,

    /// Pause between consecutive candidates
    pub cooldown: Duration,

    pub sample_interval: Duration,

    /// Pause between readiness and measurement
    pub settle: Duration,
}

impl BenchmarkConfig {
    /// Default settings for `candidates`, with the first one as baseline.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let baseline = candidates
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        Self {
            candidates,
            baseline,
            load: LoadConfig::default(),
            ready_attempts: defaults::READY_ATTEMPTS,
            ready_interval: defaults::READY_INTERVAL,
            ready_timeout: defaults::READY_TIMEOUT,
            grace_timeout: defaults::GRACE_TIMEOUT,
            cooldown: defaults::COOLDOWN,
            sample_interval: defaults::SAMPLE_INTERVAL,
            settle: defaults::SETTLE,
        }
    }

    /// Build a validated configuration from parsed command-line arguments.
    ///
    /// Candidates from `--candidates` come first, in file order, followed by
    /// any `--candidate` shorthands in command-line order.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut candidates = match &args.candidates {
            Some(path) => CandidateFile::load(path)?.candidates,
            None => Vec::new(),
        };
        candidates.extend(args.candidate.iter().cloned());

        let mut config = Self::new(candidates);
        if let Some(baseline) = &args.baseline {
            config.baseline = baseline.clone();
        }
        config.load = LoadConfig {
            total_requests: args.requests,
            concurrency: args.concurrency,
            mode: args.mode,
            warmup_requests: args.warmup,
            request_timeout: args.request_timeout,
            progress: args.progress,
        };
        config.ready_attempts = args.ready_attempts;
        config.ready_interval = args.ready_interval;
        config.ready_timeout = args.ready_timeout;
        config.grace_timeout = args.grace_timeout;
        config.cooldown = args.cooldown;
        config.sample_interval = args.sample_interval;
        config.settle = args.settle;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        validate_candidates(&self.candidates)?;
        if self.load.total_requests == 0 {
            return Err(BenchError::Config("requests must be at least 1".to_string()));
        }
        if self.load.mode == LoadMode::Concurrent && self.load.concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.ready_attempts == 0 {
            return Err(BenchError::Config(
                "ready attempts must be at least 1".to_string(),
            ));
        }
        if !self.candidates.iter().any(|c| c.name == self.baseline) {
            return Err(BenchError::Config(format!(
                "baseline '{}' is not a declared candidate",
                self.baseline
            )));
        }
        Ok(())
    }
}

/// Outcome of a whole driver invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    /// Reports of successfully measured candidates, in declaration order
    pub reports: Vec<AggregateReport>,
    pub skipped: Vec<SkippedCandidate>,
    pub comparison: ComparisonTable,
}

/// Builds a fresh process probe. Each monitor run and each attach gets its own.
pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn ProcessProbe> + Send + Sync>;

/// Raw measurements of one candidate, taken before its process is stopped.
struct Measurement {
    target: OsProcessRef,
    initial_memory_mb: Option<f64>,
    load: LoadRun,
    samples: Vec<ResourceSample>,
}

/// Runs every declared candidate in order.
pub struct BenchmarkDriver {
    config: BenchmarkConfig,
    supervisor: ProcessSupervisor,
    generator: LoadGenerator,
    probe_factory: ProbeFactory,
}

impl BenchmarkDriver {
    pub fn new(config: BenchmarkConfig) -> Result<Self, BenchError> {
        config.validate()?;
        Ok(Self {
            supervisor: ProcessSupervisor::new(config.ready_timeout)?,
            generator: LoadGenerator::new(config.load.clone())?,
            probe_factory: Arc::new(|| Box::new(SysinfoProbe::new()) as Box<dyn ProcessProbe>),
            config,
        })
    }

    /// Replace the OS probe, e.g. with a scripted one.
    pub fn with_probe_factory(mut self, factory: ProbeFactory) -> Self {
        self.probe_factory = factory;
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Benchmark every candidate, isolating per-candidate failures.
    pub async fn run(&self) -> BenchmarkRun {
        let mut reports = Vec::new();
        let mut skipped = Vec::new();

        for (i, candidate) in self.config.candidates.iter().enumerate() {
            if i > 0 && !self.config.cooldown.is_zero() {
                info!("Cooling down for {:?}...", self.config.cooldown);
                sleep(self.config.cooldown).await;
            }

            let span = info_span!("candidate", name = %candidate.name);
            match self.run_candidate(candidate).instrument(span).await {
                Ok(report) => {
                    info!(
                        "Benchmark completed for '{}': {:.2} req/s",
                        candidate.name,
                        report.rps()
                    );
                    reports.push(report);
                }
                Err(e) => {
                    error!("Skipping '{}': {}", candidate.name, e);
                    skipped.push(SkippedCandidate::from_error(&candidate.name, &e));
                }
            }
        }

        let comparison = compare(&reports, &self.config.baseline);
        BenchmarkRun {
            reports,
            skipped,
            comparison,
        }
    }

    async fn run_candidate(&self, candidate: &Candidate) -> Result<AggregateReport, BenchError> {
        info!(
            "{}",
            CandidateDisplay {
                candidate,
                load: &self.config.load,
            }
        );

        let mut handle = self.supervisor.start(candidate)?;
        let measured = self.measure(candidate, &mut handle).await;

        // Teardown runs whether or not the measurement succeeded.
        if let Err(e) = self
            .supervisor
            .stop(&mut handle, self.config.grace_timeout)
            .await
        {
            warn!("Cleanup of '{}' failed: {}", candidate.name, e);
        }

        let m = measured?;
        let summary = m.load.summarize();
        if summary.requests_completed == 0 {
            warn!(
                "'{}' completed no requests ({} failed)",
                candidate.name, summary.requests_failed
            );
        }
        if m.samples.is_empty() {
            warn!(
                "No resource samples for '{}' (pattern '{}')",
                candidate.name,
                candidate.process_pattern()
            );
        }

        Ok(AggregateReport::new(
            &candidate.name,
            m.target.name,
            m.target.pid,
            summary,
            &m.samples,
            m.initial_memory_mb,
        ))
    }

    async fn measure(
        &self,
        candidate: &Candidate,
        handle: &mut ProcessHandle,
    ) -> Result<Measurement, BenchError> {
        let url = candidate.url();
        let ready = self
            .supervisor
            .wait_ready(
                handle,
                &url,
                self.config.ready_attempts,
                self.config.ready_interval,
            )
            .await;
        if !ready {
            return Err(readiness_timeout(&url, self.config.ready_attempts));
        }

        if !self.config.settle.is_zero() {
            sleep(self.config.settle).await;
        }

        let pattern = candidate.process_pattern();
        let mut probe = (self.probe_factory)();
        let target = self
            .supervisor
            .attach_target(handle, &pattern, probe.as_mut());
        let initial_memory_mb = probe.read(target.pid).map(|s| s.memory_mb);
        if let Some(mb) = initial_memory_mb {
            info!("Initial memory of '{}': {:.1} MB", target.name, mb);
        }

        let mut monitor = ResourceMonitor::new((self.probe_factory)(), self.config.sample_interval);
        monitor.start(&pattern, Some(target.pid))?;
        let load = self.generator.run(&url).await;
        monitor.stop().await;
        let samples = monitor.samples().unwrap_or_default().to_vec();

        Ok(Measurement {
            target,
            initial_memory_mb,
            load,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["http-server-bench"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_from_args_shorthand_candidates() {
        let config = BenchmarkConfig::from_args(&args(&[
            "--candidate",
            "node=node server.js",
            "--candidate",
            "bun=bun run server.ts",
            "-n",
            "200",
            "-c",
            "8",
            "--mode",
            "serial",
        ]))
        .unwrap();

        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.baseline, "node");
        assert_eq!(config.load.total_requests, 200);
        assert_eq!(config.load.concurrency, 8);
        assert_eq!(config.load.mode, LoadMode::Serial);
        assert_eq!(config.ready_attempts, defaults::READY_ATTEMPTS);
        assert_eq!(config.sample_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_from_args_file_then_shorthand() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"candidates": [
                {{"name": "deno", "command": "deno", "args": ["run", "-A", "server.ts"]}}
            ]}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = BenchmarkConfig::from_args(&args(&[
            "--candidates",
            &path,
            "--candidate",
            "bun=bun server.ts",
            "--baseline",
            "bun",
            "--cooldown",
            "0s",
        ]))
        .unwrap();
        let names: Vec<&str> = config.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["deno", "bun"]);
        assert_eq!(config.baseline, "bun");
        assert_eq!(config.cooldown, Duration::ZERO);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        assert!(BenchmarkConfig::from_args(&args(&[])).is_err());
        assert!(BenchmarkConfig::from_args(&args(&[
            "--candidate",
            "a=x",
            "--baseline",
            "missing"
        ]))
        .is_err());
        assert!(BenchmarkConfig::from_args(&args(&["--candidate", "a=x", "-n", "0"])).is_err());
        assert!(BenchmarkConfig::from_args(&args(&["--candidate", "a=x", "-c", "0"])).is_err());
        assert!(BenchmarkConfig::from_args(&args(&[
            "--candidate",
            "a=x",
            "--candidate",
            "a=y"
        ]))
        .is_err());
    }

    #[test]
    fn test_candidate_display_banner() {
        let candidate = Candidate::new("node", "node", vec!["server.js".to_string()]);
        let load = LoadConfig::default();
        let banner = CandidateDisplay {
            candidate: &candidate,
            load: &load,
        }
        .to_string();
        assert!(banner.contains("Starting Benchmark for: node"));
        assert!(banner.contains("node server.js"));
        assert!(banner.contains("http://127.0.0.1:3000/"));
        assert!(banner.contains("concurrent, 50 in flight"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_skipped() {
        let mut config = BenchmarkConfig::new(vec![Candidate::new(
            "ghost",
            "/nonexistent/server-binary",
            vec![],
        )]);
        config.cooldown = Duration::ZERO;
        let run = BenchmarkDriver::new(config).unwrap().run().await;

        assert!(run.reports.is_empty());
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].kind, "launch");
        assert!(run.comparison.speedups.is_empty());
    }
}
