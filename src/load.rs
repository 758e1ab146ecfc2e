//! # HTTP Load Generation
//!
//! Issues a fixed number of `GET` requests against one URL and records one
//! [`RequestOutcome`] per request.
//!
//! ## Modes
//!
//! - **Serial**: one request at a time. Wall-clock duration is bounded only
//!   by the per-request timeout.
//! - **Concurrent**: a bounded pool keeps at most `concurrency` requests in
//!   flight. Outcomes are consumed in completion order, not submission order,
//!   and the pool drains exactly `total_requests` submissions.
//!
//! ## Measurement
//!
//! Latency runs from just before the request is sent until the response body
//! has been read to the end. Only HTTP 200 counts as success; every other
//! status, and every client error, becomes a failed outcome that carries no
//! latency. Warmup requests are issued before the clock starts and their
//! outcomes are discarded.

use crate::{
    defaults,
    error::{BenchError, RequestErrorKind},
    metrics::{RequestOutcome, RequestSummary},
    utils::create_progress_indicator,
};
use clap::ValueEnum;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How requests are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// One request at a time
    Serial,
    /// Bounded worker pool
    Concurrent,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Serial => write!(f, "serial"),
            LoadMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Parameters of one load phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    pub total_requests: usize,
    /// Maximum in-flight requests in concurrent mode; ignored in serial mode
    pub concurrency: usize,
    pub mode: LoadMode,
    pub warmup_requests: usize,
    pub request_timeout: Duration,
    /// Log a progress line every 10% of requests
    pub progress: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_requests: defaults::REQUESTS,
            concurrency: defaults::CONCURRENCY,
            mode: LoadMode::Concurrent,
            warmup_requests: defaults::WARMUP_REQUESTS,
            request_timeout: defaults::REQUEST_TIMEOUT,
            progress: false,
        }
    }
}

/// Raw result of one load phase.
#[derive(Debug, Clone)]
pub struct LoadRun {
    pub outcomes: Vec<RequestOutcome>,
    /// Measured wall-clock time, warmup excluded
    pub duration: Duration,
}

impl LoadRun {
    pub fn summarize(&self) -> RequestSummary {
        RequestSummary::from_outcomes(&self.outcomes, self.duration)
    }
}

/// Drives `GET` load against a single URL.
pub struct LoadGenerator {
    client: reqwest::Client,
    config: LoadConfig,
}

impl LoadGenerator {
    pub fn new(config: LoadConfig) -> Result<Self, BenchError> {
        if config.mode == LoadMode::Concurrent && config.concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.concurrency.max(1))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Warm up, then issue `total_requests` requests and collect every outcome.
    pub async fn run(&self, url: &str) -> LoadRun {
        self.warmup(url).await;

        info!(
            "Sending {} requests to {} ({} mode{})",
            self.config.total_requests,
            url,
            self.config.mode,
            match self.config.mode {
                LoadMode::Concurrent => format!(", concurrency {}", self.config.concurrency),
                LoadMode::Serial => String::new(),
            }
        );

        let started = Instant::now();
        let outcomes = match self.config.mode {
            LoadMode::Serial => self.run_serial(url).await,
            LoadMode::Concurrent => self.run_concurrent(url).await,
        };
        let duration = started.elapsed();

        debug!(
            "Load phase finished: {} outcomes in {:.2?}",
            outcomes.len(),
            duration
        );
        LoadRun { outcomes, duration }
    }

    async fn warmup(&self, url: &str) {
        if self.config.warmup_requests == 0 {
            return;
        }
        let mut succeeded = 0;
        for _ in 0..self.config.warmup_requests {
            if self.send_one(url).await.success {
                succeeded += 1;
            }
        }
        debug!(
            "Warmup: {}/{} requests succeeded",
            succeeded, self.config.warmup_requests
        );
    }

    async fn run_serial(&self, url: &str) -> Vec<RequestOutcome> {
        let mut progress = Progress::new(self.config.total_requests, self.config.progress);
        let mut outcomes = Vec::with_capacity(self.config.total_requests);
        for _ in 0..self.config.total_requests {
            outcomes.push(self.send_one(url).await);
            progress.record(outcomes.len());
        }
        outcomes
    }

    async fn run_concurrent(&self, url: &str) -> Vec<RequestOutcome> {
        let mut progress = Progress::new(self.config.total_requests, self.config.progress);
        let mut outcomes = Vec::with_capacity(self.config.total_requests);
        let mut in_flight = stream::iter(0..self.config.total_requests)
            .map(|_| self.send_one(url))
            .buffer_unordered(self.config.concurrency);

        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
            progress.record(outcomes.len());
        }
        outcomes
    }

    async fn send_one(&self, url: &str) -> RequestOutcome {
        let started = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return RequestOutcome::failed(RequestErrorKind::from_reqwest(&e)),
        };

        let status = response.status();
        match response.bytes().await {
            Ok(_) if status == StatusCode::OK => RequestOutcome::succeeded(started.elapsed()),
            Ok(_) => RequestOutcome::failed(RequestErrorKind::Status(status.as_u16())),
            Err(e) => RequestOutcome::failed(RequestErrorKind::from_reqwest(&e)),
        }
    }
}

/// Emits one progress line per 10% of completed requests.
struct Progress {
    total: usize,
    step: usize,
    next: usize,
    enabled: bool,
}

impl Progress {
    fn new(total: usize, enabled: bool) -> Self {
        let step = (total / 10).max(1);
        Self {
            total,
            step,
            next: step,
            enabled,
        }
    }

    fn record(&mut self, done: usize) {
        if !self.enabled || done < self.next {
            return;
        }
        self.next = done + self.step;
        info!(
            "[{}] {}/{} ({:.0}%)",
            create_progress_indicator(done, self.total, 20),
            done,
            self.total,
            done as f64 * 100.0 / self.total.max(1) as f64
        );
    }
}
