//! # Reports, Comparison and Results Output
//!
//! [`AggregateReport`] is the immutable per-candidate record produced at the
//! end of a candidate run. [`compare`] ranks a set of reports and frames each
//! candidate's throughput against a baseline. [`ResultsManager`] persists a
//! whole run as a JSON document for later analysis.
//!
//! ## Speedup convention
//!
//! `speedup = candidate.rps / baseline.rps`. A speedup above 1 reads
//! `"{speedup}x faster"`; anything else reads `"{1 / speedup}x slower"`,
//! including an exact tie (`"1.00x slower"`). Published comparisons rely on
//! this asymmetric framing, so it is kept as is.

use crate::{
    benchmark::BenchmarkRun,
    error::BenchError,
    load::LoadConfig,
    metrics::{Efficiency, RequestSummary, ResourceAggregate, ResourceSample},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Derived record for one candidate. One per candidate per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub name: String,
    /// Name of the OS process resources were attributed to
    pub process_name: String,
    pub pid: u32,
    #[serde(flatten)]
    pub requests: RequestSummary,
    /// `None` when the monitor never matched the process: no data, not zero usage
    pub resources: Option<ResourceAggregate>,
    pub efficiency: Efficiency,
    /// Memory of the target after readiness, before any load
    pub initial_memory_mb: Option<f64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AggregateReport {
    /// Reduce a candidate's measurements into its report.
    pub fn new(
        name: impl Into<String>,
        process_name: impl Into<String>,
        pid: u32,
        requests: RequestSummary,
        samples: &[ResourceSample],
        initial_memory_mb: Option<f64>,
    ) -> Self {
        let resources = ResourceAggregate::reduce(samples);
        let efficiency = match &resources {
            Some(r) => Efficiency::derive(requests.rps, r.avg_cpu, r.avg_memory),
            None => Efficiency::default(),
        };
        Self {
            name: name.into(),
            process_name: process_name.into(),
            pid,
            requests,
            resources,
            efficiency,
            initial_memory_mb,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn rps(&self) -> f64 {
        self.requests.rps
    }

    pub fn avg_latency_ms(&self) -> f64 {
        self.requests.latency.avg
    }

    pub fn avg_memory_mb(&self) -> Option<f64> {
        self.resources.map(|r| r.avg_memory)
    }
}

/// A candidate whose measurement was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub name: String,
    /// Machine-friendly failure class, see [`BenchError::kind`]
    pub kind: String,
    pub reason: String,
}

impl SkippedCandidate {
    pub fn from_error(name: impl Into<String>, err: &BenchError) -> Self {
        Self {
            name: name.into(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Best candidate for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub name: String,
    pub value: f64,
}

/// Throughput relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "factor", rename_all = "snake_case")]
pub enum SpeedupVerdict {
    Faster(f64),
    /// Holds the reciprocal of the speedup
    Slower(f64),
    /// One side has no throughput to compare
    Incomparable,
}

impl SpeedupVerdict {
    pub fn from_rps(rps: f64, baseline_rps: f64) -> Self {
        if !(rps > 0.0 && baseline_rps > 0.0) {
            return SpeedupVerdict::Incomparable;
        }
        let speedup = rps / baseline_rps;
        if speedup > 1.0 {
            SpeedupVerdict::Faster(speedup)
        } else {
            SpeedupVerdict::Slower(1.0 / speedup)
        }
    }
}

impl std::fmt::Display for SpeedupVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedupVerdict::Faster(x) => write!(f, "{:.2}x faster", x),
            SpeedupVerdict::Slower(x) => write!(f, "{:.2}x slower", x),
            SpeedupVerdict::Incomparable => write!(f, "n/a"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedupEntry {
    pub name: String,
    /// Raw `rps / baseline_rps`, when comparable
    pub speedup: Option<f64>,
    pub verdict: SpeedupVerdict,
}

/// Cross-candidate ranking and baseline framing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub baseline: String,
    pub best_throughput: Option<Winner>,
    pub best_latency: Option<Winner>,
    pub best_memory: Option<Winner>,
    /// One entry per non-baseline report, in report order
    pub speedups: Vec<SpeedupEntry>,
}

/// Rank `reports` and compare each non-baseline report against `baseline`.
///
/// Ties go to the earlier report. Latency only ranks reports with at least
/// one successful request, memory only ranks reports with resource data. An
/// unknown baseline yields no speedup entries.
pub fn compare(reports: &[AggregateReport], baseline: &str) -> ComparisonTable {
    let best_throughput = pick(reports.iter().map(|r| (r, Some(r.rps()))), |a, b| a > b);
    let best_latency = pick(
        reports.iter().map(|r| {
            let measured = r.requests.requests_completed > 0;
            (r, measured.then(|| r.avg_latency_ms()))
        }),
        |a, b| a < b,
    );
    let best_memory = pick(reports.iter().map(|r| (r, r.avg_memory_mb())), |a, b| a < b);

    let speedups = match reports.iter().find(|r| r.name == baseline) {
        Some(base) => reports
            .iter()
            .filter(|r| r.name != baseline)
            .map(|r| {
                let verdict = SpeedupVerdict::from_rps(r.rps(), base.rps());
                SpeedupEntry {
                    name: r.name.clone(),
                    speedup: (verdict != SpeedupVerdict::Incomparable)
                        .then(|| r.rps() / base.rps()),
                    verdict,
                }
            })
            .collect(),
        None => Vec::new(),
    };

    ComparisonTable {
        baseline: baseline.to_string(),
        best_throughput,
        best_latency,
        best_memory,
        speedups,
    }
}

fn pick<'a>(
    candidates: impl Iterator<Item = (&'a AggregateReport, Option<f64>)>,
    better: fn(f64, f64) -> bool,
) -> Option<Winner> {
    let mut best: Option<Winner> = None;
    for (report, value) in candidates {
        let Some(value) = value else { continue };
        let replace = match &best {
            Some(current) => better(value, current.value),
            None => true,
        };
        if replace {
            best = Some(Winner {
                name: report.name.clone(),
                value,
            });
        }
    }
    best
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub memory_gb: f64,
    /// Minimum supported Rust version declared by the crate, not the
    /// compiler that built it
    pub msrv: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            memory_gb: system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
            msrv: env!("CARGO_PKG_RUST_VERSION").to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

/// Run-level metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub candidates_declared: usize,
    pub system_info: SystemInfo,
}

/// Document written by [`ResultsManager::finalize`]
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalResults {
    pub metadata: RunMetadata,
    pub load: LoadConfig,
    pub reports: Vec<AggregateReport>,
    pub skipped: Vec<SkippedCandidate>,
    pub comparison: ComparisonTable,
}

/// Writes a finished run to a JSON file.
pub struct ResultsManager {
    output_file: PathBuf,
    run_id: String,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Result<Self> {
        if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
        Ok(Self {
            output_file: output_file.to_path_buf(),
            run_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Write the run, its load settings and system metadata as pretty JSON.
    pub fn finalize(&self, run: &BenchmarkRun, load: &LoadConfig) -> Result<()> {
        let results = FinalResults {
            metadata: RunMetadata {
                version: crate::VERSION.to_string(),
                run_id: self.run_id.clone(),
                timestamp: chrono::Utc::now(),
                candidates_declared: run.reports.len() + run.skipped.len(),
                system_info: SystemInfo::collect(),
            },
            load: load.clone(),
            reports: run.reports.clone(),
            skipped: run.skipped.clone(),
            comparison: run.comparison.clone(),
        };

        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }
}
