//! # Candidate Process Supervision
//!
//! Owns the lifecycle of exactly one candidate process at a time: launch,
//! readiness polling, resolution of the process that actually serves
//! traffic, and termination.
//!
//! ## Process groups
//!
//! On Unix every candidate is launched as the leader of a fresh process
//! group. Runtimes that are started through a launcher (`npm start`, a shell
//! wrapper, `deno task`) fork the real server as a descendant; signalling the
//! whole group ensures those descendants are torn down along with the
//! launcher and never keep the port bound into the next candidate's run.
//!
//! ## Termination
//!
//! [`ProcessSupervisor::stop`] sends a graceful terminate, waits for the
//! grace timeout and escalates to a forced kill. Escalation is logged, not
//! returned as an error. `stop` is idempotent and tolerates processes that
//! already exited on their own.

use crate::{
    config::Candidate,
    error::{BenchError, RequestErrorKind},
    probe::{descendants, name_matches, ProcessProbe},
};
use reqwest::StatusCode;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// A launched candidate process. Only the supervisor acts on it.
#[derive(Debug)]
pub struct ProcessHandle {
    candidate: String,
    command: String,
    pid: u32,
    child: Child,
    launched_at: Instant,
    exit_status: Option<ExitStatus>,
    stopped: bool,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn uptime(&self) -> Duration {
        self.launched_at.elapsed()
    }

    /// Whether the launched process has exited, reaping it if so.
    pub fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                true
            }
            _ => false,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        // Backstop for handles dropped on an error path; `kill_on_drop`
        // covers the leader, this covers the rest of its group.
        #[cfg(unix)]
        let _ = signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
    }
}

/// The OS process resource usage is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsProcessRef {
    pub pid: u32,
    pub name: String,
}

/// Launches, probes and terminates candidate processes.
pub struct ProcessSupervisor {
    client: reqwest::Client,
}

impl ProcessSupervisor {
    /// Create a supervisor whose readiness probes give up on each attempt after `attempt_timeout`.
    pub fn new(attempt_timeout: Duration) -> Result<Self, BenchError> {
        let client = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .connect_timeout(attempt_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Spawn the candidate's launch command.
    ///
    /// Working directory and environment are inherited; stdio is discarded
    /// so server logging cannot stall on a full pipe.
    pub fn start(&self, candidate: &Candidate) -> Result<ProcessHandle, BenchError> {
        let mut cmd = Command::new(&candidate.command);
        cmd.args(&candidate.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let launch_error = |source: std::io::Error| BenchError::Launch {
            command: candidate.command_line(),
            source,
        };
        let child = cmd.spawn().map_err(&launch_error)?;
        let pid = child.id().ok_or_else(|| {
            launch_error(std::io::Error::new(
                std::io::ErrorKind::Other,
                "process exited before its pid could be read",
            ))
        })?;

        info!("Launched '{}' (pid {})", candidate.command_line(), pid);
        Ok(ProcessHandle {
            candidate: candidate.name.clone(),
            command: candidate.command.clone(),
            pid,
            child,
            launched_at: Instant::now(),
            exit_status: None,
            stopped: false,
        })
    }

    /// Poll `url` until it answers HTTP 200.
    ///
    /// Connection failures and timeouts only mean "not yet". Returns `false`
    /// once `max_attempts` are exhausted, or as soon as the launched process
    /// is seen to have exited. The caller is responsible for stopping the
    /// process when this returns `false`.
    pub async fn wait_ready(
        &self,
        handle: &mut ProcessHandle,
        url: &str,
        max_attempts: u32,
        poll_interval: Duration,
    ) -> bool {
        for attempt in 1..=max_attempts {
            if handle.has_exited() {
                warn!(
                    "'{}' exited during startup ({:?})",
                    handle.candidate, handle.exit_status
                );
                return false;
            }

            match self.client.get(url).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    info!(
                        "'{}' ready after {} attempt(s) in {:.2?}",
                        handle.candidate,
                        attempt,
                        handle.uptime()
                    );
                    return true;
                }
                Ok(resp) => debug!(
                    "Readiness attempt {}/{}: HTTP {}",
                    attempt,
                    max_attempts,
                    resp.status()
                ),
                Err(e) => debug!(
                    "Readiness attempt {}/{}: {}",
                    attempt,
                    max_attempts,
                    RequestErrorKind::from_reqwest(&e)
                ),
            }

            if attempt < max_attempts {
                sleep(poll_interval).await;
            }
        }

        warn!(
            "'{}' not ready at {} after {} attempts",
            handle.candidate, url, max_attempts
        );
        false
    }

    /// Resolve the process that actually serves requests.
    ///
    /// The first descendant (breadth first, lowest pid first) whose name
    /// matches `pattern` wins; otherwise the launched process itself.
    pub fn attach_target(
        &self,
        handle: &ProcessHandle,
        pattern: &str,
        probe: &mut dyn ProcessProbe,
    ) -> OsProcessRef {
        probe.refresh();
        let processes = probe.processes();

        if let Some(child) = descendants(&processes, handle.pid)
            .into_iter()
            .find(|p| name_matches(&p.name, pattern))
        {
            debug!(
                "Attached to descendant '{}' (pid {}) of launcher pid {}",
                child.name, child.pid, handle.pid
            );
            return OsProcessRef {
                pid: child.pid,
                name: child.name,
            };
        }

        let name = processes
            .iter()
            .find(|p| p.pid == handle.pid)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| handle.command.clone());
        debug!("Attached to launched process '{}' (pid {})", name, handle.pid);
        OsProcessRef {
            pid: handle.pid,
            name,
        }
    }

    /// Terminate the process (and on Unix its process group).
    ///
    /// Graceful terminate first; after `grace` a forced kill. Safe to call
    /// repeatedly and on processes that already exited.
    pub async fn stop(
        &self,
        handle: &mut ProcessHandle,
        grace: Duration,
    ) -> Result<(), BenchError> {
        if handle.stopped {
            return Ok(());
        }

        if handle.has_exited() {
            debug!(
                "'{}' (pid {}) had already exited: {:?}",
                handle.candidate, handle.pid, handle.exit_status
            );
            sweep_group(handle.pid);
            handle.stopped = true;
            return Ok(());
        }

        terminate(handle)?;

        match timeout(grace, handle.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("'{}' exited with {}", handle.candidate, status);
                handle.exit_status = Some(status);
            }
            Ok(Err(e)) => {
                return Err(BenchError::Termination {
                    pid: handle.pid,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "'{}' (pid {}) ignored terminate for {:?}; force-killing",
                    handle.candidate, handle.pid, grace
                );
                sweep_group(handle.pid);
                handle
                    .child
                    .kill()
                    .await
                    .map_err(|e| BenchError::Termination {
                        pid: handle.pid,
                        reason: e.to_string(),
                    })?;
                handle.exit_status = handle.child.try_wait().ok().flatten();
            }
        }

        sweep_group(handle.pid);
        handle.stopped = true;
        Ok(())
    }
}

#[cfg(unix)]
fn terminate(handle: &mut ProcessHandle) -> Result<(), BenchError> {
    signal_group(handle.pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(not(unix))]
fn terminate(handle: &mut ProcessHandle) -> Result<(), BenchError> {
    handle
        .child
        .start_kill()
        .map_err(|e| BenchError::Termination {
            pid: handle.pid,
            reason: e.to_string(),
        })
}

/// Force-kill whatever is left of the group led by `pid`.
fn sweep_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Err(e) = signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
            debug!("Group sweep for pid {} failed: {}", pid, e);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), BenchError> {
    use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(BenchError::Termination {
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::probe::SysinfoProbe;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(Duration::from_millis(200)).unwrap()
    }

    fn shell(name: &str, script: &str) -> Candidate {
        Candidate::new(name, "sh", vec!["-c".to_string(), script.to_string()])
    }

    /// A URL on which nothing is listening.
    fn dead_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/", port)
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let candidate = Candidate::new("ghost", "/nonexistent/definitely-not-a-server", vec![]);
        match supervisor().start(&candidate) {
            Err(BenchError::Launch { command, .. }) => {
                assert!(command.contains("definitely-not-a-server"))
            }
            other => panic!("expected launch error, got {:?}", other.map(|h| h.pid())),
        }
    }

    #[tokio::test]
    async fn test_readiness_exhaustion_then_stop_leaves_no_process() {
        let sup = supervisor();
        let candidate = Candidate::new("sleeper", "sleep", vec!["30".to_string()]);
        let mut handle = sup.start(&candidate).unwrap();

        let ready = sup
            .wait_ready(&mut handle, &dead_url(), 3, Duration::from_millis(20))
            .await;
        assert!(!ready);
        assert!(!handle.has_exited());

        sup.stop(&mut handle, Duration::from_secs(2)).await.unwrap();
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_readiness_aborts_when_process_exits() {
        let sup = supervisor();
        let mut handle = sup.start(&shell("quitter", "exit 3")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let ready = sup
            .wait_ready(&mut handle, &dead_url(), 100, Duration::from_millis(50))
            .await;
        assert!(!ready);
        assert!(started.elapsed() < Duration::from_secs(2));
        sup.stop(&mut handle, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let sup = supervisor();
        let mut handle = sup
            .start(&Candidate::new("sleeper", "sleep", vec!["30".to_string()]))
            .unwrap();
        sup.stop(&mut handle, Duration::from_secs(2)).await.unwrap();
        sup.stop(&mut handle, Duration::from_secs(2)).await.unwrap();
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let sup = supervisor();
        let mut handle = sup
            .start(&shell("stubborn", "trap '' TERM; while true; do sleep 0.1; done"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        sup.stop(&mut handle, Duration::from_millis(200)).await.unwrap();
        assert!(handle.has_exited());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_attach_prefers_matching_descendant() {
        let sup = supervisor();
        // The trailing `true` keeps the shell from exec'ing into sleep.
        let mut handle = sup.start(&shell("launcher", "sleep 30; true")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut probe = SysinfoProbe::new();
        let target = sup.attach_target(&handle, "sleep", &mut probe);
        assert_ne!(target.pid, handle.pid());
        assert!(target.name.starts_with("sleep"));

        let fallback = sup.attach_target(&handle, "no-such-runtime", &mut probe);
        assert_eq!(fallback.pid, handle.pid());

        sup.stop(&mut handle, Duration::from_secs(2)).await.unwrap();
    }

    /// Stand-in for a multi-threaded server that forks nothing. Its threads
    /// carry a name matching the executable so they look like candidates.
    #[test]
    #[ignore = "launched as a child by test_attach_keeps_multithreaded_server"]
    fn threaded_server_stand_in() {
        let workers: Vec<_> = (0..4)
            .map(|i| {
                std::thread::Builder::new()
                    .name(format!("http_server_bench-{}", i))
                    .spawn(|| std::thread::sleep(Duration::from_secs(10)))
                    .unwrap()
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_attach_keeps_multithreaded_server() {
        use crate::monitor::ResourceMonitor;

        let exe = std::env::current_exe().unwrap();
        let candidate = Candidate::new(
            "threaded",
            exe.to_string_lossy(),
            vec![
                "supervisor::tests::threaded_server_stand_in".to_string(),
                "--exact".to_string(),
                "--ignored".to_string(),
            ],
        );
        let sup = supervisor();
        let mut handle = sup.start(&candidate).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Kernel comm names are cut to 15 bytes, so match on a short prefix.
        let pattern = "http_server";
        let mut probe = SysinfoProbe::new();
        let target = sup.attach_target(&handle, pattern, &mut probe);
        assert_eq!(target.pid, handle.pid());

        let mut monitor = ResourceMonitor::new(
            Box::new(SysinfoProbe::new()),
            Duration::from_millis(50),
        );
        monitor.start(pattern, Some(target.pid)).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        monitor.stop().await;

        let samples = monitor.samples().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.thread_count > 1));

        sup.stop(&mut handle, Duration::from_secs(2)).await.unwrap();
    }
}
