//! # Error Taxonomy
//!
//! Failures in this crate fall into two groups. Per-candidate failures
//! ([`BenchError`]) abort the measurement of a single candidate and surface in
//! the final run as a skip record. Per-request failures ([`RequestErrorKind`])
//! never abort anything; they are tallied in the candidate's report.
//!
//! Transient monitor misses (the target process not being found on a tick)
//! are not represented here at all: the tick is dropped and logged at trace
//! level.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure that ends the measurement of one candidate.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The launch command could not be spawned (missing binary, permission denied).
    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The candidate never answered HTTP 200 on its readiness probe.
    #[error("candidate not ready at {url} after {attempts} attempts")]
    ReadinessTimeout { url: String, attempts: u32 },

    /// A resource monitor was driven out of its `Idle -> Sampling -> Stopped` order.
    #[error("resource monitor cannot {action} while {state}")]
    MonitorState {
        action: &'static str,
        state: &'static str,
    },

    /// Waiting on or signalling the candidate process failed outright.
    #[error("failed to terminate process {pid}: {reason}")]
    Termination { pid: u32, reason: String },

    /// Invalid benchmark or candidate configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BenchError {
    /// Short machine-friendly label used in skip records.
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::Launch { .. } => "launch",
            BenchError::ReadinessTimeout { .. } => "readiness_timeout",
            BenchError::MonitorState { .. } => "monitor_state",
            BenchError::Termination { .. } => "termination",
            BenchError::Config(_) => "config",
            BenchError::Http(_) => "http",
        }
    }
}

/// Classification of a single failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestErrorKind {
    /// The request exceeded its timeout.
    Timeout,
    /// The connection could not be established (refused, reset, unreachable).
    Connect,
    /// The server answered with something other than 200.
    Status(u16),
    /// The response body could not be read to completion.
    Body,
    /// Any other client-side failure.
    Other,
}

impl RequestErrorKind {
    /// Classify a `reqwest` failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestErrorKind::Timeout
        } else if err.is_connect() {
            RequestErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            RequestErrorKind::Body
        } else if let Some(status) = err.status() {
            RequestErrorKind::Status(status.as_u16())
        } else {
            RequestErrorKind::Other
        }
    }
}

impl std::fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestErrorKind::Timeout => write!(f, "timeout"),
            RequestErrorKind::Connect => write!(f, "connect"),
            RequestErrorKind::Status(code) => write!(f, "http_{}", code),
            RequestErrorKind::Body => write!(f, "body"),
            RequestErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Convenience constructor used by the supervisor when polling gives up.
pub(crate) fn readiness_timeout(url: &str, attempts: u32) -> BenchError {
    BenchError::ReadinessTimeout {
        url: url.to_string(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_kind_display() {
        assert_eq!(RequestErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(RequestErrorKind::Connect.to_string(), "connect");
        assert_eq!(RequestErrorKind::Status(503).to_string(), "http_503");
        assert_eq!(RequestErrorKind::Body.to_string(), "body");
        assert_eq!(RequestErrorKind::Other.to_string(), "other");
    }

    #[test]
    fn test_bench_error_kind_labels() {
        let launch = BenchError::Launch {
            command: "missing".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(launch.kind(), "launch");
        assert!(launch.to_string().contains("missing"));

        let ready = readiness_timeout("http://127.0.0.1:3000/", 20);
        assert_eq!(ready.kind(), "readiness_timeout");
        assert!(ready.to_string().contains("20 attempts"));
    }
}
