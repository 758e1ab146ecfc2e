//! Candidate declarations.
//!
//! A [`Candidate`] is one server implementation under test. Candidates are
//! declared up front (from a JSON file or the `--candidate` shorthand) and are
//! read-only for the rest of the run.

use crate::error::BenchError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One server implementation under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Display name, unique within a run
    pub name: String,

    /// Executable to launch
    pub command: String,

    /// Arguments passed to `command`
    #[serde(default)]
    pub args: Vec<String>,

    /// Case-insensitive prefix of the OS process name that serves traffic.
    ///
    /// Defaults to the file stem of `command` (e.g. `node` for `/usr/bin/node`).
    #[serde(default)]
    pub process_name: Option<String>,

    /// Host the candidate listens on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the candidate listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path requested by both the readiness probe and the load generator
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_host() -> String {
    crate::defaults::HOST.to_string()
}

fn default_port() -> u16 {
    crate::defaults::PORT
}

fn default_path() -> String {
    "/".to_string()
}

impl Candidate {
    /// Create a candidate with default host, port and path.
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            process_name: None,
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_process_name(mut self, pattern: impl Into<String>) -> Self {
        self.process_name = Some(pattern.into());
        self
    }

    /// The process-name pattern used for resource attribution.
    pub fn process_pattern(&self) -> String {
        match &self.process_name {
            Some(p) if !p.is_empty() => p.clone(),
            _ => Path::new(&self.command)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.command.clone()),
        }
    }

    /// Target URL for readiness and load.
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    /// Launch command as a single printable string.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// Parse the `NAME=COMMAND [ARGS...]` shorthand accepted on the command line.
    pub fn parse_shorthand(shorthand: &str) -> Result<Self, BenchError> {
        let (name, rest) = shorthand.split_once('=').ok_or_else(|| {
            BenchError::Config(format!("expected NAME=COMMAND, got '{}'", shorthand))
        })?;
        let name = name.trim();
        let mut parts = rest.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| BenchError::Config(format!("candidate '{}' has no command", name)))?;
        if name.is_empty() {
            return Err(BenchError::Config(format!(
                "candidate name missing in '{}'",
                shorthand
            )));
        }
        Ok(Self::new(name, command, parts.map(str::to_string).collect()))
    }
}

/// On-disk candidate list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFile {
    pub candidates: Vec<Candidate>,
}

impl CandidateFile {
    /// Load and parse a JSON candidate file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read candidate file {:?}", path))?;
        let file: CandidateFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse candidate file {:?}", path))?;
        Ok(file)
    }
}

/// Check that a candidate list is usable: non-empty and uniquely named.
pub fn validate_candidates(candidates: &[Candidate]) -> Result<(), BenchError> {
    if candidates.is_empty() {
        return Err(BenchError::Config("no candidates declared".to_string()));
    }
    for (i, c) in candidates.iter().enumerate() {
        if c.name.trim().is_empty() {
            return Err(BenchError::Config(format!(
                "candidate #{} has an empty name",
                i + 1
            )));
        }
        if c.command.trim().is_empty() {
            return Err(BenchError::Config(format!(
                "candidate '{}' has an empty command",
                c.name
            )));
        }
        if c.port == 0 {
            return Err(BenchError::Config(format!(
                "candidate '{}' has port 0",
                c.name
            )));
        }
        if candidates[..i].iter().any(|other| other.name == c.name) {
            return Err(BenchError::Config(format!(
                "duplicate candidate name '{}'",
                c.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_candidate_defaults_and_url() {
        let c = Candidate::new("node", "/usr/local/bin/node", vec!["server.js".into()]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.url(), "http://127.0.0.1:3000/");
        assert_eq!(c.process_pattern(), "node");
        assert_eq!(c.command_line(), "/usr/local/bin/node server.js");

        let c = c.with_port(8081).with_process_name("nodejs");
        assert_eq!(c.url(), "http://127.0.0.1:8081/");
        assert_eq!(c.process_pattern(), "nodejs");
    }

    #[test]
    fn test_url_path_normalization() {
        let mut c = Candidate::new("bun", "bun", vec![]);
        c.path = "users".to_string();
        assert_eq!(c.url(), "http://127.0.0.1:3000/users");
    }

    #[test]
    fn test_parse_shorthand() {
        let c = Candidate::parse_shorthand("bun=bun run server.ts").unwrap();
        assert_eq!(c.name, "bun");
        assert_eq!(c.command, "bun");
        assert_eq!(c.args, vec!["run".to_string(), "server.ts".to_string()]);

        assert!(Candidate::parse_shorthand("no-equals-sign").is_err());
        assert!(Candidate::parse_shorthand("empty=").is_err());
        assert!(Candidate::parse_shorthand("=cmd").is_err());
    }

    #[test]
    fn test_candidate_file_load_applies_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"candidates": [
                {{"name": "node", "command": "node", "args": ["hello.js"]}},
                {{"name": "custom", "command": "./srv", "port": 8080,
                  "path": "/health", "process_name": "srv"}}
            ]}}"#
        )
        .unwrap();

        let loaded = CandidateFile::load(file.path()).unwrap();
        assert_eq!(loaded.candidates.len(), 2);
        assert_eq!(loaded.candidates[0].port, 3000);
        assert_eq!(loaded.candidates[0].path, "/");
        assert_eq!(loaded.candidates[1].url(), "http://127.0.0.1:8080/health");
        assert_eq!(loaded.candidates[1].process_pattern(), "srv");
    }

    #[test]
    fn test_validate_candidates() {
        assert!(validate_candidates(&[]).is_err());

        let a = Candidate::new("a", "x", vec![]);
        let b = Candidate::new("b", "y", vec![]);
        assert!(validate_candidates(&[a.clone(), b]).is_ok());
        assert!(validate_candidates(&[a.clone(), a.clone()]).is_err());
        assert!(validate_candidates(&[a.with_port(0)]).is_err());
    }
}
