//! # Measurement Types and Reductions
//!
//! Raw measurements ([`RequestOutcome`], [`ResourceSample`]) and the reductions
//! that turn them into report values ([`LatencySummary`], [`RequestSummary`],
//! [`ResourceAggregate`], [`Efficiency`]).
//!
//! ## Percentile convention
//!
//! Latency percentiles use direct indexing into the ascending-sorted latency
//! list without interpolation, `sorted[floor(q * n)]`, so that results stay
//! comparable with previously published numbers. Two small-sample rules apply:
//!
//! - `p95` is only indexed when more than 20 latencies exist, otherwise it is
//!   the arithmetic mean of all latencies.
//! - `p99` is only indexed when more than 50 latencies exist, otherwise it is
//!   the arithmetic mean.
//!
//! With no successful requests every latency statistic is `0.0`.

use crate::error::RequestErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Minimum number of latencies before `p95` is indexed instead of averaged.
pub const P95_MIN_SAMPLES: usize = 20;

/// Minimum number of latencies before `p99` is indexed instead of averaged.
pub const P99_MIN_SAMPLES: usize = 50;

/// Result of one issued request.
///
/// `latency_ms` is present iff `success` is true.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub error: Option<RequestErrorKind>,
}

impl RequestOutcome {
    pub fn succeeded(latency: Duration) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency.as_secs_f64() * 1000.0),
            error: None,
        }
    }

    pub fn failed(kind: RequestErrorKind) -> Self {
        Self {
            success: false,
            latency_ms: None,
            error: Some(kind),
        }
    }
}

/// One point-in-time reading of the target process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub thread_count: u32,
}

/// Latency statistics in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    /// Summarize a set of latencies given in milliseconds, in any order.
    pub fn from_latencies(latencies: &[f64]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut sorted = latencies.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let avg = sorted.iter().sum::<f64>() / n as f64;

        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let p95 = if n > P95_MIN_SAMPLES {
            index_percentile(&sorted, 0.95)
        } else {
            avg
        };
        let p99 = if n > P99_MIN_SAMPLES {
            index_percentile(&sorted, 0.99)
        } else {
            avg
        };

        Self {
            avg,
            median,
            min: sorted[0],
            max: sorted[n - 1],
            p50: index_percentile(&sorted, 0.50),
            p90: index_percentile(&sorted, 0.90),
            p95,
            p99,
        }
    }
}

/// `sorted[floor(q * n)]`, clamped to the last element.
///
/// `sorted` must be non-empty and ascending.
pub fn index_percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = (q * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Throughput and latency for one measured load phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub requests_completed: usize,
    pub requests_failed: usize,
    pub duration_sec: f64,
    pub rps: f64,
    pub latency: LatencySummary,
    /// Failed requests grouped by kind
    pub errors: BTreeMap<String, usize>,
}

impl RequestSummary {
    /// Reduce raw outcomes measured over `duration`.
    pub fn from_outcomes(outcomes: &[RequestOutcome], duration: Duration) -> Self {
        let latencies: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.latency_ms)
            .collect();
        let requests_completed = latencies.len();
        let requests_failed = outcomes.len() - requests_completed;

        let mut errors = BTreeMap::new();
        for kind in outcomes.iter().filter(|o| !o.success).filter_map(|o| o.error) {
            *errors.entry(kind.to_string()).or_insert(0) += 1;
        }

        let duration_sec = duration.as_secs_f64();
        let rps = if requests_completed > 0 && duration_sec > 0.0 {
            requests_completed as f64 / duration_sec
        } else {
            0.0
        };

        Self {
            requests_completed,
            requests_failed,
            duration_sec,
            rps,
            latency: LatencySummary::from_latencies(&latencies),
            errors,
        }
    }
}

/// Reduction of the monitor's samples for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAggregate {
    pub avg_cpu: f64,
    pub max_cpu: f64,
    pub avg_memory: f64,
    pub peak_memory: f64,
    /// Mean thread count rounded to the nearest integer, halves to even
    pub avg_threads: f64,
    pub sample_count: usize,
}

impl ResourceAggregate {
    /// `None` when no samples were taken; absent data is not zero usage.
    pub fn reduce(samples: &[ResourceSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let avg_cpu = samples.iter().map(|s| s.cpu_percent).sum::<f64>() / n;
        let max_cpu = samples.iter().map(|s| s.cpu_percent).fold(f64::MIN, f64::max);
        let avg_memory = samples.iter().map(|s| s.memory_mb).sum::<f64>() / n;
        let peak_memory = samples.iter().map(|s| s.memory_mb).fold(f64::MIN, f64::max);
        let avg_threads = (samples.iter().map(|s| s.thread_count as f64).sum::<f64>() / n)
            .round_ties_even();

        Some(Self {
            avg_cpu,
            max_cpu,
            avg_memory,
            peak_memory,
            avg_threads,
            sample_count: samples.len(),
        })
    }
}

/// Throughput normalised by resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Efficiency {
    pub rps_per_cpu_point: f64,
    pub rps_per_mb: f64,
}

impl Efficiency {
    /// A zero (or non-finite) denominator yields `0.0` for that ratio.
    pub fn derive(rps: f64, cpu_percent: f64, memory_mb: f64) -> Self {
        Self {
            rps_per_cpu_point: guarded_ratio(rps, cpu_percent),
            rps_per_mb: guarded_ratio(rps, memory_mb),
        }
    }
}

fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && denominator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}
