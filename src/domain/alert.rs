use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::service::ChannelKind;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// First detected failure
    Warning,
    /// Remediation exhausted
    Critical,
}

impl Severity {
    /// Get emoji prefix for severity
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Warning => "\u{26a0}\u{fe0f}",
            Severity::Critical => "\u{1f6a8}",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert payload; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub service: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(service: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn warning(service: &str, message: impl Into<String>) -> Self {
        Self::new(service, Severity::Warning, message)
    }

    pub fn critical(service: &str, message: impl Into<String>) -> Self {
        Self::new(service, Severity::Critical, message)
    }

    /// Subject line for mail and chat channels
    pub fn subject(&self) -> String {
        format!(
            "[{}] {} {}",
            self.severity.as_str().to_uppercase(),
            self.service,
            match self.severity {
                Severity::Warning => "is unhealthy",
                Severity::Critical => "remediation exhausted",
            }
        )
    }

    /// Plain-text rendering shared by channels
    pub fn format_text(&self) -> String {
        format!(
            "{} {}\n\nService: {}\nTime: {}\n\n{}",
            self.severity.emoji(),
            self.subject(),
            self.service,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message
        )
    }
}

/// Per-channel delivery outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    TimedOut,
    /// Channel bound to the service but not configured
    Disabled,
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDelivery {
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
}

/// What happened to one alert raised during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub severity: Severity,
    /// Suppressed by the cool-down window; nothing was sent
    pub suppressed: bool,
    pub deliveries: Vec<ChannelDelivery>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_alert_format_text() {
        let event = AlertEvent::warning("api", "probe timed out after 2000ms");
        let text = event.format_text();
        assert!(text.contains("[WARNING] api is unhealthy"));
        assert!(text.contains("Service: api"));
        assert!(text.contains("probe timed out after 2000ms"));

        let critical = AlertEvent::critical("api", "2 attempts");
        assert_eq!(critical.subject(), "[CRITICAL] api remediation exhausted");
    }

    #[test]
    fn test_delivery_status_serialization() {
        let json = serde_json::to_string(&DeliveryStatus::Failed("503".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"503"}"#);
        let json = serde_json::to_string(&DeliveryStatus::Delivered).unwrap();
        assert_eq!(json, r#"{"status":"delivered"}"#);
    }
}
