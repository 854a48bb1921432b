use async_trait::async_trait;
use std::time::Duration;
use sysinfo::System;

use super::{Probe, ProbeVerdict};
use crate::domain::HealthStatus;

/// Healthy iff a process whose name or command line contains the signature
/// is running. Never reports Unknown.
pub struct ProcessProbe {
    pattern: String,
}

impl ProcessProbe {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }
}

/// Scan the process table, ignoring the supervisor itself
fn process_running(pattern: &str) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    let own_pid = sysinfo::get_current_pid().ok();

    sys.processes().iter().any(|(pid, process)| {
        Some(*pid) != own_pid
            && (process.name().contains(pattern) || process.cmd().join(" ").contains(pattern))
    })
}

#[async_trait]
impl Probe for ProcessProbe {
    fn kind(&self) -> &'static str {
        "process"
    }

    async fn probe(&self, _timeout: Duration) -> ProbeVerdict {
        let pattern = self.pattern.clone();
        match tokio::task::spawn_blocking(move || process_running(&pattern)).await {
            Ok(true) => ProbeVerdict::healthy(),
            Ok(false) => ProbeVerdict::unhealthy(format!("no process matching '{}'", self.pattern)),
            Err(e) => ProbeVerdict::unhealthy(format!("process scan failed: {}", e)),
        }
    }

    fn timeout_status(&self) -> HealthStatus {
        HealthStatus::Unhealthy
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_running_process_is_healthy() {
        let mut child = std::process::Command::new("sleep")
            .arg("37.125")
            .spawn()
            .unwrap();

        let verdict = ProcessProbe::new("37.125").probe(Duration::from_secs(5)).await;
        let _ = child.kill();
        let _ = child.wait();

        assert_eq!(verdict.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_missing_process_is_unhealthy() {
        let verdict = ProcessProbe::new("no-such-process-7f3a9c")
            .probe(Duration::from_secs(5))
            .await;
        assert_eq!(verdict.status, HealthStatus::Unhealthy);
    }
}
