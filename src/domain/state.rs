use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::alert::Severity;
use crate::error::RemediationError;

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// The probe itself errored (timeout, malformed response)
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supervisor view of a service across cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not probed yet; treated as unhealthy for the first alerting decision
    Unknown,
    Healthy,
    Unhealthy,
    /// Remediation exhausted within the cool-down window
    Critical,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "UNKNOWN",
            ServiceStatus::Healthy => "HEALTHY",
            ServiceStatus::Unhealthy => "UNHEALTHY",
            ServiceStatus::Critical => "CRITICAL",
        }
    }

    pub fn is_failing(&self) -> bool {
        !matches!(self, ServiceStatus::Healthy)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable per-service bookkeeping, owned by the supervisor loop.
///
/// All mutation goes through the transition methods below; callers hold the
/// service's lock for the whole read-modify-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    pub status: ServiceStatus,
    pub consecutive_failures: u32,
    /// Last dispatched alert per severity
    #[serde(default)]
    pub last_alerts: HashMap<Severity, DateTime<Utc>>,
    pub last_remediation: Option<DateTime<Utc>>,
    /// Start of the current remediation window
    pub window_started_at: Option<DateTime<Utc>>,
    pub attempts_in_window: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            status: ServiceStatus::Unknown,
            consecutive_failures: 0,
            last_alerts: HashMap::new(),
            last_remediation: None,
            window_started_at: None,
            attempts_in_window: 0,
            last_checked: None,
        }
    }

    /// Last alert of `severity`, if any
    pub fn last_alert(&self, severity: Severity) -> Option<DateTime<Utc>> {
        self.last_alerts.get(&severity).copied()
    }

    /// Record that an alert of `severity` was dispatched
    pub fn record_alert(&mut self, severity: Severity, now: DateTime<Utc>) {
        self.last_alerts.insert(severity, now);
    }

    /// Attempts counted against the window that is open at `now`
    pub fn attempts_at(&self, now: DateTime<Utc>, cooldown: Duration) -> u32 {
        match self.window_started_at {
            Some(start) if elapsed_since(start, now) < cooldown => self.attempts_in_window,
            _ => 0,
        }
    }

    /// Reserve a remediation attempt, opening a fresh window if the previous
    /// one has elapsed. Check and increment happen together.
    pub fn begin_remediation(
        &mut self,
        now: DateTime<Utc>,
        cooldown: Duration,
        max_attempts: u32,
    ) -> Result<u32, RemediationError> {
        let window_open = self
            .window_started_at
            .is_some_and(|start| elapsed_since(start, now) < cooldown);

        if !window_open {
            self.window_started_at = Some(now);
            self.attempts_in_window = 0;
        }

        if self.attempts_in_window >= max_attempts {
            return Err(RemediationError::RateLimited {
                attempts: self.attempts_in_window,
                window_secs: cooldown.as_secs(),
            });
        }

        self.attempts_in_window += 1;
        self.last_remediation = Some(now);
        Ok(self.attempts_in_window)
    }

    /// Verified healthy probe: clears failure and attempt counters.
    /// Returns true when the service was previously failing.
    pub fn record_healthy(&mut self, now: DateTime<Utc>) -> bool {
        let recovered = self.status.is_failing() && self.last_checked.is_some();
        self.status = ServiceStatus::Healthy;
        self.consecutive_failures = 0;
        self.attempts_in_window = 0;
        self.window_started_at = None;
        self.last_checked = Some(now);
        recovered
    }

    /// Failed verification (or no remediation possible); stays failing
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        if self.status != ServiceStatus::Critical {
            self.status = ServiceStatus::Unhealthy;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_checked = Some(now);
    }

    /// A fresh window allowed a new attempt but the service is still down
    pub fn demote_to_unhealthy(&mut self) {
        self.status = ServiceStatus::Unhealthy;
    }

    /// Remediation exhausted
    pub fn escalate(&mut self) {
        self.status = ServiceStatus::Critical;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const COOLDOWN: Duration = Duration::from_secs(60);

    #[test]
    fn test_new_state_is_unknown() {
        let state = ServiceState::new();
        assert_eq!(state.status, ServiceStatus::Unknown);
        assert!(state.status.is_failing());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_remediation_attempts_are_capped_per_window() {
        let mut state = ServiceState::new();
        let t0 = Utc::now();

        assert_eq!(state.begin_remediation(t0, COOLDOWN, 2), Ok(1));
        assert_eq!(
            state.begin_remediation(t0 + ChronoDuration::seconds(10), COOLDOWN, 2),
            Ok(2)
        );
        let err = state
            .begin_remediation(t0 + ChronoDuration::seconds(20), COOLDOWN, 2)
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(state.attempts_in_window, 2);

        // Window elapses naturally
        let later = t0 + ChronoDuration::seconds(61);
        assert_eq!(state.attempts_at(later, COOLDOWN), 0);
        assert_eq!(state.begin_remediation(later, COOLDOWN, 2), Ok(1));
    }

    #[test]
    fn test_healthy_resets_counters() {
        let mut state = ServiceState::new();
        let now = Utc::now();
        state.record_failure(now);
        state.begin_remediation(now, COOLDOWN, 3).unwrap();
        state.record_failure(now);
        assert_eq!(state.consecutive_failures, 2);

        assert!(state.record_healthy(now));
        assert_eq!(state.status, ServiceStatus::Healthy);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.attempts_in_window, 0);
        assert!(state.window_started_at.is_none());

        // Already healthy: not a recovery
        assert!(!state.record_healthy(now));
    }

    #[test]
    fn test_first_healthy_probe_is_not_a_recovery() {
        let mut state = ServiceState::new();
        assert!(!state.record_healthy(Utc::now()));
    }

    #[test]
    fn test_failure_keeps_critical() {
        let mut state = ServiceState::new();
        let now = Utc::now();
        state.escalate();
        state.record_failure(now);
        assert_eq!(state.status, ServiceStatus::Critical);
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = ServiceState::new();
        state.record_alert(Severity::Warning, Utc::now());
        let json = serde_json::to_string(&state).unwrap();
        let back: ServiceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
