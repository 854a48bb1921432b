//! Per-cycle report types and their operator-facing renderings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use uuid::Uuid;

use super::alert::AlertRecord;
use super::state::{HealthStatus, ServiceStatus};
use crate::error::RemediationError;

/// Host utilization; a metric that could not be read is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Busy time across all cores since the previous refresh; not the load
    /// average
    pub cpu_used_percent: Option<f64>,
    pub mem_used_percent: Option<f64>,
    pub disk_used_percent: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

/// Pressure level of a host metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Warning,
    Critical,
}

/// A host metric over its threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePressure {
    pub metric: String,
    pub value: f64,
    pub level: PressureLevel,
}

/// Outcome of asking the executor to remediate a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub attempted: bool,
    /// Attempt number within the current window (0 when not attempted)
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RemediationError>,
    pub duration_ms: u64,
}

impl RemediationResult {
    pub fn succeeded(attempt: u32, duration_ms: u64) -> Self {
        Self {
            attempted: true,
            attempt,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(attempt: u32, error: RemediationError, duration_ms: u64) -> Self {
        Self {
            attempted: true,
            attempt,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn not_attempted(error: RemediationError) -> Self {
        Self {
            attempted: false,
            attempt: 0,
            error: Some(error),
            duration_ms: 0,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(RemediationError::is_rate_limited)
    }
}

/// Everything that happened to one service in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOutcome {
    pub service: String,
    /// Result of the initial probe pass
    pub probe_status: HealthStatus,
    /// True final status after remediation and verification
    pub final_status: ServiceStatus,
    pub latency_ms: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub alerts: Vec<AlertRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationResult>,
    pub recovered: bool,
    /// Remediation not started because shutdown was requested
    pub remediation_skipped: bool,
}

impl ServiceOutcome {
    /// Alerts actually sent (not suppressed)
    pub fn alerts_dispatched(&self) -> usize {
        self.alerts.iter().filter(|a| !a.suppressed).count()
    }

    pub fn remediation_attempted(&self) -> bool {
        self.remediation.as_ref().is_some_and(|r| r.attempted)
    }
}

/// Structured summary of one monitoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ServiceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSnapshot>,
    #[serde(default)]
    pub pressure: Vec<ResourcePressure>,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "PROBE")]
    probe: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LATENCY")]
    latency: String,
    #[tabled(rename = "FAILURES")]
    failures: u32,
    #[tabled(rename = "ALERTS")]
    alerts: String,
    #[tabled(rename = "REMEDIATION")]
    remediation: String,
}

fn fmt_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "n/a".to_string())
}

impl CycleReport {
    /// Find the outcome for a service
    pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
        self.outcomes.iter().find(|o| o.service == service)
    }

    pub fn alerts_dispatched(&self) -> usize {
        self.outcomes.iter().map(ServiceOutcome::alerts_dispatched).sum()
    }

    pub fn remediation_attempts(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.remediation_attempted())
            .count()
    }

    /// Count services per final status
    pub fn count_status(&self, status: ServiceStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.final_status == status)
            .count()
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// One-line machine-parsable form
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Human-readable summary with a per-service table
    pub fn render_summary(&self) -> String {
        let rows: Vec<OutcomeRow> = self
            .outcomes
            .iter()
            .map(|o| OutcomeRow {
                service: o.service.clone(),
                probe: o.probe_status.to_string(),
                status: if o.recovered {
                    format!("{} (recovered)", o.final_status)
                } else {
                    o.final_status.to_string()
                },
                latency: format!("{}ms", o.latency_ms),
                failures: o.consecutive_failures,
                alerts: match (o.alerts_dispatched(), o.alerts.len()) {
                    (0, 0) => "-".to_string(),
                    (sent, total) if sent == total => sent.to_string(),
                    (sent, total) => format!("{} ({} suppressed)", sent, total - sent),
                },
                remediation: match (&o.remediation, o.remediation_skipped) {
                    (_, true) => "skipped (shutdown)".to_string(),
                    (None, false) => "-".to_string(),
                    (Some(r), false) => match (&r.error, r.attempted) {
                        (None, _) => format!("attempt #{}", r.attempt),
                        (Some(RemediationError::RateLimited { .. }), _) => {
                            "rate limited".to_string()
                        }
                        (Some(e), true) => format!("attempt #{} failed: {}", r.attempt, e),
                        (Some(e), false) => e.to_string(),
                    },
                },
            })
            .collect();

        let mut out = format!(
            "Cycle {} at {} ({}ms)\n",
            self.cycle_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.duration_ms()
        );

        if rows.is_empty() {
            out.push_str("(no services registered)\n");
        } else {
            let mut table = Table::new(rows);
            table.with(Style::modern());
            out.push_str(&table.to_string());
            out.push('\n');
        }

        out.push_str(&format!(
            "Services: {} healthy, {} unhealthy, {} critical | alerts sent: {} | remediations: {}\n",
            self.count_status(ServiceStatus::Healthy),
            self.count_status(ServiceStatus::Unhealthy) + self.count_status(ServiceStatus::Unknown),
            self.count_status(ServiceStatus::Critical),
            self.alerts_dispatched(),
            self.remediation_attempts(),
        ));

        if let Some(ref res) = self.resources {
            out.push_str(&format!(
                "Host: cpu {} | mem {} | disk {}\n",
                fmt_percent(res.cpu_used_percent),
                fmt_percent(res.mem_used_percent),
                fmt_percent(res.disk_used_percent),
            ));
        }

        for p in &self.pressure {
            out.push_str(&format!(
                "  ! {} at {:.1}% ({:?})\n",
                p.metric, p.value, p.level
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::{ChannelDelivery, DeliveryStatus, Severity};
    use crate::domain::service::ChannelKind;

    fn outcome(service: &str, status: ServiceStatus) -> ServiceOutcome {
        ServiceOutcome {
            service: service.to_string(),
            probe_status: HealthStatus::Healthy,
            final_status: status,
            latency_ms: 12,
            consecutive_failures: 0,
            detail: None,
            alerts: Vec::new(),
            remediation: None,
            recovered: false,
            remediation_skipped: false,
        }
    }

    fn report(outcomes: Vec<ServiceOutcome>) -> CycleReport {
        let now = Utc::now();
        CycleReport {
            cycle_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            outcomes,
            resources: Some(ResourceSnapshot {
                cpu_used_percent: Some(12.5),
                mem_used_percent: None,
                disk_used_percent: Some(91.0),
                sampled_at: now,
            }),
            pressure: vec![ResourcePressure {
                metric: "disk".to_string(),
                value: 91.0,
                level: PressureLevel::Critical,
            }],
        }
    }

    #[test]
    fn test_counts() {
        let mut api = outcome("api", ServiceStatus::Unhealthy);
        api.alerts.push(AlertRecord {
            severity: Severity::Warning,
            suppressed: false,
            deliveries: vec![ChannelDelivery {
                channel: ChannelKind::Log,
                status: DeliveryStatus::Delivered,
            }],
        });
        api.alerts.push(AlertRecord {
            severity: Severity::Warning,
            suppressed: true,
            deliveries: Vec::new(),
        });
        api.remediation = Some(RemediationResult::succeeded(1, 40));

        let mut db = outcome("db", ServiceStatus::Critical);
        db.remediation = Some(RemediationResult::not_attempted(
            RemediationError::RateLimited {
                attempts: 2,
                window_secs: 60,
            },
        ));

        let report = report(vec![api, db, outcome("worker", ServiceStatus::Healthy)]);
        assert_eq!(report.alerts_dispatched(), 1);
        assert_eq!(report.remediation_attempts(), 1);
        assert_eq!(report.count_status(ServiceStatus::Critical), 1);
        assert!(report.outcome("db").unwrap().remediation.as_ref().unwrap().is_rate_limited());
        assert!(report.outcome("missing").is_none());
    }

    #[test]
    fn test_render_summary() {
        let mut api = outcome("api", ServiceStatus::Healthy);
        api.recovered = true;
        let summary = report(vec![api]).render_summary();
        assert!(summary.contains("api"));
        assert!(summary.contains("HEALTHY (recovered)"));
        assert!(summary.contains("cpu 12.5%"));
        assert!(summary.contains("mem n/a"));
        assert!(summary.contains("disk at 91.0%"));
    }

    #[test]
    fn test_json_line_has_machine_fields() {
        let line = report(vec![outcome("api", ServiceStatus::Healthy)])
            .to_json_line()
            .unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["outcomes"][0]["service"], "api");
        assert_eq!(value["outcomes"][0]["final_status"], "healthy");
        assert_eq!(value["outcomes"][0]["latency_ms"], 12);
        assert_eq!(value["resources"]["disk_used_percent"], 91.0);
        assert_eq!(value["resources"]["cpu_used_percent"], 12.5);
        assert!(value["resources"].get("cpu_load_percent").is_none());
    }
}
