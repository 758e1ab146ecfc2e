//! # OS Process Probe
//!
//! Capability interface over the operating system's process table. The
//! supervisor uses it to resolve which process actually serves traffic, and
//! the resource monitor uses it to read CPU, memory and thread counts. Neither
//! touches the OS directly, which keeps both testable with a scripted probe.
//!
//! [`SysinfoProbe`] is the production implementation, backed by the `sysinfo`
//! crate on every platform it supports.

use crate::metrics::ResourceSample;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Minimal identity of a live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
}

/// Read access to the OS process table.
///
/// `read` reports values as of the most recent `refresh`. CPU usage is the
/// rate accumulated between the two most recent refreshes of the same process.
pub trait ProcessProbe: Send {
    /// Re-scan the process table.
    fn refresh(&mut self);

    /// Every process seen by the last refresh.
    fn processes(&self) -> Vec<ProcessInfo>;

    /// Resource usage of `pid`, or `None` if it vanished or cannot be read.
    fn read(&self, pid: u32) -> Option<ResourceSample>;
}

/// Case-insensitive prefix match on a process name.
pub fn name_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().starts_with(&pattern.to_lowercase())
}

/// Pick the process to attribute resources to.
///
/// `preferred` wins if it is still alive and still matches. Otherwise the
/// lowest matching pid is used so repeated scans agree with each other.
pub fn find_by_name(
    processes: &[ProcessInfo],
    pattern: &str,
    preferred: Option<u32>,
) -> Option<u32> {
    let matching = processes.iter().filter(|p| name_matches(&p.name, pattern));
    if let Some(pid) = preferred {
        if matching.clone().any(|p| p.pid == pid) {
            return Some(pid);
        }
    }
    matching.map(|p| p.pid).min()
}

/// All descendants of `root`, breadth first, children in pid order.
pub fn descendants(processes: &[ProcessInfo], root: u32) -> Vec<ProcessInfo> {
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for parent in frontier {
            let mut children: Vec<&ProcessInfo> = processes
                .iter()
                .filter(|p| p.parent == Some(parent) && p.pid != parent)
                .collect();
            children.sort_by_key(|p| p.pid);
            for child in children {
                if child.pid != root && !found.iter().any(|f: &ProcessInfo| f.pid == child.pid) {
                    next.push(child.pid);
                    found.push(child.clone());
                }
            }
        }
        frontier = next;
    }

    found
}

/// `sysinfo`-backed probe.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::new().with_cpu().with_memory()
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn refresh(&mut self) {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
    }

    /// Real processes only. On Linux sysinfo also lists every thread as an
    /// entry whose parent is the owning process; those are dropped here so a
    /// server's own threads are never taken for forked children.
    fn processes(&self) -> Vec<ProcessInfo> {
        self.system
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                parent: p.parent().map(|pp| pp.as_u32()),
                name: p.name().to_string_lossy().into_owned(),
            })
            .collect()
    }

    fn read(&self, pid: u32) -> Option<ResourceSample> {
        let process = self.system.process(Pid::from_u32(pid))?;
        // Thread ids are only exposed on Linux; elsewhere count the main thread.
        let threads = process.tasks().map(|t| t.len().max(1)).unwrap_or(1);
        Some(ResourceSample {
            cpu_percent: process.cpu_usage() as f64,
            memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
            thread_count: threads as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pid: u32, parent: Option<u32>, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            parent,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_name_matches_is_case_insensitive_prefix() {
        assert!(name_matches("node", "node"));
        assert!(name_matches("Node.exe", "node"));
        assert!(name_matches("nodejs", "NODE"));
        assert!(!name_matches("bun", "node"));
        assert!(!name_matches("my-node", "node"));
    }

    #[test]
    fn test_find_by_name_prefers_live_target() {
        let procs = vec![
            info(10, Some(1), "node"),
            info(42, Some(1), "node"),
            info(7, Some(1), "bash"),
        ];
        assert_eq!(find_by_name(&procs, "node", Some(42)), Some(42));
        // Preferred pid no longer matches: fall back to the lowest pid.
        assert_eq!(find_by_name(&procs, "node", Some(7)), Some(10));
        assert_eq!(find_by_name(&procs, "node", None), Some(10));
        assert_eq!(find_by_name(&procs, "bun", None), None);
    }

    #[test]
    fn test_descendants_breadth_first() {
        let procs = vec![
            info(100, Some(1), "launcher"),
            info(103, Some(100), "worker"),
            info(101, Some(100), "runtime"),
            info(200, Some(101), "runtime-helper"),
            info(300, Some(1), "unrelated"),
        ];
        let found: Vec<u32> = descendants(&procs, 100).iter().map(|p| p.pid).collect();
        assert_eq!(found, vec![101, 103, 200]);
        assert!(descendants(&procs, 300).is_empty());
    }

    #[test]
    fn test_sysinfo_probe_sees_current_process() {
        let mut probe = SysinfoProbe::new();
        probe.refresh();
        let me = std::process::id();
        assert!(probe.processes().iter().any(|p| p.pid == me));
        let sample = probe.read(me).expect("current process should be readable");
        assert!(sample.memory_mb > 0.0);
        assert!(sample.thread_count >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sysinfo_probe_skips_thread_entries() {
        let (release, parked) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::Builder::new()
            .name("probe-worker".to_string())
            .spawn(move || {
                let _ = parked.recv();
            })
            .unwrap();

        let me = std::process::id();
        let tids: Vec<u32> = std::fs::read_dir("/proc/self/task")
            .unwrap()
            .filter_map(|e| e.ok()?.file_name().to_str()?.parse().ok())
            .filter(|&tid| tid != me)
            .collect();
        assert!(!tids.is_empty());

        let mut probe = SysinfoProbe::new();
        probe.refresh();
        let procs = probe.processes();
        assert!(procs.iter().any(|p| p.pid == me));
        assert!(procs.iter().all(|p| !tids.contains(&p.pid)));
        assert!(probe.read(me).unwrap().thread_count > 1);

        drop(release);
        worker.join().unwrap();
    }
}
