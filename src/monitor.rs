//! # Background Resource Monitor
//!
//! Samples CPU, memory and thread count of a candidate's serving process on a
//! fixed period while load is being generated.
//!
//! ## Lifecycle
//!
//! `Idle -> Sampling -> Stopped`. The monitor is one-shot: a stopped monitor
//! cannot be restarted, each candidate run gets a fresh instance.
//!
//! ## Synchronization
//!
//! The sampling task owns the sample buffer exclusively while it runs and
//! hands it back through its join handle. [`ResourceMonitor::stop`] signals
//! the task and awaits that handle, so once `stop` returns no further sample
//! can be appended and the buffer is read without any locking.
//!
//! ## Transient absence
//!
//! A tick on which no process matches the pattern, or the matched process
//! vanishes or cannot be read, is dropped silently. The first reading of a
//! newly matched process only establishes the CPU baseline and is not
//! recorded, since CPU usage is a rate between two consecutive readings.

use crate::{
    error::BenchError,
    metrics::ResourceSample,
    probe::{find_by_name, ProcessProbe},
};
use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, trace, warn};

/// Lifecycle state of a [`ResourceMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sampling,
    Stopped,
}

impl MonitorState {
    fn label(self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Sampling => "sampling",
            MonitorState::Stopped => "stopped",
        }
    }
}

/// Per-tick sampling logic, moved onto the blocking pool for each tick.
struct Sampler {
    probe: Box<dyn ProcessProbe>,
    pattern: String,
    preferred: Option<u32>,
    baseline: Option<u32>,
}

impl Sampler {
    fn tick(&mut self) -> Option<ResourceSample> {
        self.probe.refresh();
        let processes = self.probe.processes();
        let pid = find_by_name(&processes, &self.pattern, self.preferred)?;
        let sample = self.probe.read(pid)?;
        if self.baseline != Some(pid) {
            self.baseline = Some(pid);
            trace!("CPU baseline established for pid {}", pid);
            return None;
        }
        Some(sample)
    }
}

struct SamplingTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Vec<ResourceSample>>,
}

/// Periodic, cancellable resource sampler for one candidate run.
pub struct ResourceMonitor {
    state: MonitorState,
    period: Duration,
    probe: Option<Box<dyn ProcessProbe>>,
    task: Option<SamplingTask>,
    samples: Vec<ResourceSample>,
}

impl ResourceMonitor {
    /// Create an idle monitor that will sample every `period`.
    pub fn new(probe: Box<dyn ProcessProbe>, period: Duration) -> Self {
        Self {
            state: MonitorState::Idle,
            period: period.max(Duration::from_millis(1)),
            probe: Some(probe),
            task: None,
            samples: Vec::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Begin sampling the first live process whose name starts with `pattern`.
    ///
    /// `preferred` is the pid resolved by the supervisor; it is used as long
    /// as it keeps matching the pattern.
    pub fn start(&mut self, pattern: &str, preferred: Option<u32>) -> Result<(), BenchError> {
        let probe = match (self.state, self.probe.take()) {
            (MonitorState::Idle, Some(probe)) => probe,
            (state, probe) => {
                self.probe = probe;
                return Err(BenchError::MonitorState {
                    action: "start",
                    state: state.label(),
                });
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.period;
        let mut sampler = Sampler {
            probe,
            pattern: pattern.to_string(),
            preferred,
            baseline: None,
        };

        let handle = tokio::spawn(async move {
            let mut samples = Vec::new();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let joined = tokio::task::spawn_blocking(move || {
                            let sample = sampler.tick();
                            (sampler, sample)
                        })
                        .await;
                        match joined {
                            Ok((returned, sample)) => {
                                sampler = returned;
                                match sample {
                                    Some(s) => samples.push(s),
                                    None => trace!(
                                        "No readable '{}' process this tick",
                                        sampler.pattern
                                    ),
                                }
                            }
                            Err(e) => {
                                warn!("Resource sampling aborted: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            samples
        });

        debug!(
            "Resource monitor sampling '{}' every {:?}",
            pattern, self.period
        );
        self.task = Some(SamplingTask {
            stop: stop_tx,
            handle,
        });
        self.state = MonitorState::Sampling;
        Ok(())
    }

    /// Stop sampling and wait for the sampling task to exit.
    ///
    /// Safe to call in any state; a monitor that never started simply ends
    /// up stopped with no samples.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // The task may already have ended on its own; a closed channel is fine.
            let _ = task.stop.send(());
            match task.handle.await {
                Ok(samples) => self.samples = samples,
                Err(e) => warn!("Resource monitor task failed: {}", e),
            }
        }
        if self.state != MonitorState::Stopped {
            debug!(
                "Resource monitor stopped with {} samples",
                self.samples.len()
            );
        }
        self.state = MonitorState::Stopped;
        self.probe = None;
    }

    /// Collected samples, in append order. `None` until [`stop`](Self::stop) has returned.
    pub fn samples(&self) -> Option<&[ResourceSample]> {
        match self.state {
            MonitorState::Stopped => Some(&self.samples),
            _ => None,
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProcessInfo;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Instant;

    /// Scripted probe: the target is visible only on the listed refreshes.
    struct ScriptedProbe {
        refreshes: Arc<AtomicUsize>,
        visible: fn(usize) -> bool,
        current: usize,
    }

    impl ScriptedProbe {
        fn new(visible: fn(usize) -> bool) -> (Self, Arc<AtomicUsize>) {
            let refreshes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    refreshes: refreshes.clone(),
                    visible,
                    current: 0,
                },
                refreshes,
            )
        }
    }

    impl ProcessProbe for ScriptedProbe {
        fn refresh(&mut self) {
            self.current = self.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        fn processes(&self) -> Vec<ProcessInfo> {
            let mut procs = vec![ProcessInfo {
                pid: 1,
                parent: None,
                name: "init".to_string(),
            }];
            if (self.visible)(self.current) {
                procs.push(ProcessInfo {
                    pid: 4242,
                    parent: Some(1),
                    name: "Server".to_string(),
                });
            }
            procs
        }

        fn read(&self, pid: u32) -> Option<ResourceSample> {
            (pid == 4242).then_some(ResourceSample {
                cpu_percent: 12.5,
                memory_mb: 64.0,
                thread_count: 3,
            })
        }
    }

    #[tokio::test]
    async fn test_absent_process_yields_no_samples_and_stop_returns() {
        let (probe, refreshes) = ScriptedProbe::new(|_| false);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(10));
        monitor.start("server", None).unwrap();
        assert!(monitor.samples().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let started = Instant::now();
        monitor.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(monitor.samples(), Some(&[][..]));
        assert!(refreshes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_samples_recorded_after_baseline() {
        let (probe, _) = ScriptedProbe::new(|_| true);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(10));
        monitor.start("server", None).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop().await;

        let samples = monitor.samples().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.memory_mb == 64.0 && s.thread_count == 3));
    }

    #[tokio::test]
    async fn test_transient_absence_is_tolerated() {
        // Visible on even refreshes only; every odd tick is skipped.
        let (probe, refreshes) = ScriptedProbe::new(|n| n % 2 == 0);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(5));
        monitor.start("serv", None).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop().await;

        let ticks = refreshes.load(Ordering::SeqCst);
        let recorded = monitor.samples().unwrap().len();
        assert!(recorded < ticks);
    }

    #[tokio::test]
    async fn test_no_samples_appended_after_stop() {
        let (probe, refreshes) = ScriptedProbe::new(|_| true);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(5));
        monitor.start("server", None).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        monitor.stop().await;

        let count = monitor.samples().unwrap().len();
        let ticks = refreshes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(monitor.samples().unwrap().len(), count);
        assert_eq!(refreshes.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn test_state_machine_is_one_shot() {
        let (probe, _) = ScriptedProbe::new(|_| false);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(10));
        assert_eq!(monitor.state(), MonitorState::Idle);

        monitor.start("x", None).unwrap();
        assert_eq!(monitor.state(), MonitorState::Sampling);
        assert!(matches!(
            monitor.start("x", None),
            Err(BenchError::MonitorState { action: "start", .. })
        ));

        monitor.stop().await;
        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(monitor.start("x", None).is_err());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (probe, refreshes) = ScriptedProbe::new(|_| true);
        let mut monitor = ResourceMonitor::new(Box::new(probe), Duration::from_millis(10));
        monitor.stop().await;
        assert_eq!(monitor.samples(), Some(&[][..]));
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }
}
