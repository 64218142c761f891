//! Network reachability probe.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of probing a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
    TimedOut,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Reachable => "reachable",
            ProbeOutcome::Unreachable => "unreachable",
            ProbeOutcome::TimedOut => "timed_out",
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Tests whether a host answers within a bounded time.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> ProbeOutcome;
}

/// Probes hosts with a single echo request from the platform `ping` tool.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl Default for PingProber {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

impl PingProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different probe executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn count_args() -> [&'static str; 2] {
        if cfg!(windows) {
            ["-n", "1"]
        } else {
            ["-c", "1"]
        }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, host: &str, timeout: Duration) -> ProbeOutcome {
        // A leading dash would be parsed as an option
        if host.is_empty() || host.starts_with('-') {
            warn!("Refusing to probe malformed host '{}'", host);
            return ProbeOutcome::Unreachable;
        }

        let mut child = match Command::new(&self.program)
            .args(Self::count_args())
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to run probe tool '{}': {}", self.program, e);
                return ProbeOutcome::Unreachable;
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                debug!("Host {} is reachable", host);
                ProbeOutcome::Reachable
            }
            Ok(Ok(status)) => {
                debug!("Host {} is unreachable (probe exit: {})", host, status);
                ProbeOutcome::Unreachable
            }
            Ok(Err(e)) => {
                warn!("Probe of {} failed: {}", host, e);
                ProbeOutcome::Unreachable
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", host, timeout);
                ProbeOutcome::TimedOut
            }
        }
    }
}
