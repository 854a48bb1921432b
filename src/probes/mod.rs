//! Health probes
//!
//! Each probe kind implements [`Probe`]; [`check`] wraps any probe with the
//! hard timeout and latency measurement so no probe can block a cycle.

pub mod http;
pub mod process;
pub mod systemd;
pub mod tcp;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::{HealthStatus, ProbeKind, ServiceDescriptor};
use crate::error::Result;

pub use http::HttpProbe;
pub use process::ProcessProbe;
pub use systemd::SystemdProbe;
pub use tcp::TcpProbe;

/// What a probe observed, before timing is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl ProbeVerdict {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            detail: Some(detail.into()),
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            detail: Some(detail.into()),
        }
    }
}

/// Status plus latency of one probe invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub latency: Duration,
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// One health check transport
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe kind name
    fn kind(&self) -> &'static str;

    /// Run the check. Implementations should honor `timeout` where the
    /// transport supports it; [`check`] enforces it regardless.
    async fn probe(&self, timeout: Duration) -> ProbeVerdict;

    /// Status recorded when the hard timeout fires
    fn timeout_status(&self) -> HealthStatus {
        HealthStatus::Unknown
    }
}

/// Run one health check for one service under a hard timeout
pub async fn check(probe: &dyn Probe, descriptor: &ServiceDescriptor, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let verdict = match tokio::time::timeout(timeout, probe.probe(timeout)).await {
        Ok(verdict) => verdict,
        Err(_) => ProbeVerdict {
            status: probe.timeout_status(),
            detail: Some(format!("probe timed out after {}ms", timeout.as_millis())),
        },
    };
    let latency = start.elapsed();

    debug!(
        "Probe {} ({}) -> {} in {}ms",
        descriptor.name,
        probe.kind(),
        verdict.status,
        latency.as_millis()
    );

    ProbeOutcome {
        status: verdict.status,
        latency,
        detail: verdict.detail,
    }
}

/// Shared HTTP client for endpoint probes
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Create the probe instance for a kind
pub fn probe_for(kind: &ProbeKind, http: &reqwest::Client) -> Arc<dyn Probe> {
    match kind {
        ProbeKind::Http { url, method } => Arc::new(HttpProbe::new(http.clone(), url, *method)),
        ProbeKind::Process { pattern } => Arc::new(ProcessProbe::new(pattern)),
        ProbeKind::Tcp { address } => Arc::new(TcpProbe::new(address)),
        ProbeKind::Systemd { unit } => Arc::new(SystemdProbe::new(unit)),
    }
}
