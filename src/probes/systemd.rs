use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Probe, ProbeVerdict};

/// Healthy iff `systemctl is-active` reports the unit active
pub struct SystemdProbe {
    program: String,
    unit: String,
}

impl SystemdProbe {
    pub fn new(unit: &str) -> Self {
        Self::with_program("systemctl", unit)
    }

    /// Use a different service manager binary with the same CLI contract
    pub fn with_program(program: &str, unit: &str) -> Self {
        Self {
            program: program.to_string(),
            unit: unit.to_string(),
        }
    }
}

#[async_trait]
impl Probe for SystemdProbe {
    fn kind(&self) -> &'static str {
        "systemd"
    }

    async fn probe(&self, _timeout: Duration) -> ProbeVerdict {
        let status = Command::new(&self.program)
            .args(["is-active", "--quiet", &self.unit])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(s) if s.success() => ProbeVerdict::healthy(),
            Ok(s) => ProbeVerdict::unhealthy(format!("unit {} is not active ({})", self.unit, s)),
            Err(e) => ProbeVerdict::unknown(format!("failed to run {}: {}", self.program, e)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::HealthStatus;

    #[tokio::test]
    async fn test_active_unit_is_healthy() {
        let verdict = SystemdProbe::with_program("true", "nginx")
            .probe(Duration::from_secs(1))
            .await;
        assert_eq!(verdict.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_inactive_unit_is_unhealthy() {
        let verdict = SystemdProbe::with_program("false", "nginx")
            .probe(Duration::from_secs(1))
            .await;
        assert_eq!(verdict.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unknown() {
        let verdict = SystemdProbe::with_program("/nonexistent/systemctl", "nginx")
            .probe(Duration::from_secs(1))
            .await;
        assert_eq!(verdict.status, HealthStatus::Unknown);
    }
}
