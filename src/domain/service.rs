use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP method used by endpoint probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(format!("unsupported HTTP probe method '{}'", other)),
        }
    }
}

/// How a service's health is checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    /// GET/HEAD against a URL, healthy on 2xx
    Http { url: String, method: HttpMethod },
    /// A running process whose name or command line contains `pattern`
    Process { pattern: String },
    /// TCP connect to `host:port`
    Tcp { address: String },
    /// OS service unit reports active
    Systemd { unit: String },
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Http { .. } => "http",
            ProbeKind::Process { .. } => "process",
            ProbeKind::Tcp { .. } => "tcp",
            ProbeKind::Systemd { .. } => "systemd",
        }
    }

    /// Build a probe kind from its configured name and target
    pub fn parse(kind: &str, target: &str, method: Option<&str>) -> Result<Self, String> {
        if target.trim().is_empty() {
            return Err(format!("probe '{}' requires a non-empty target", kind));
        }
        let target = target.trim().to_string();

        match kind {
            "http" => {
                url::Url::parse(&target)
                    .map_err(|e| format!("invalid probe URL '{}': {}", target, e))?;
                let method = method
                    .map(str::parse::<HttpMethod>)
                    .transpose()?
                    .unwrap_or(HttpMethod::Get);
                Ok(ProbeKind::Http { url: target, method })
            }
            "process" => Ok(ProbeKind::Process { pattern: target }),
            "tcp" | "port" => {
                if !target.contains(':') {
                    return Err(format!("tcp probe target '{}' must be host:port", target));
                }
                Ok(ProbeKind::Tcp { address: target })
            }
            "systemd" => Ok(ProbeKind::Systemd { unit: target }),
            other => Err(format!("unknown probe kind '{}'", other)),
        }
    }
}

/// Corrective action bound to a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationKind {
    /// `systemctl restart <unit>`
    SystemdRestart { unit: String },
    /// Restart a managed container through the deployment collaborator
    ContainerRestart { service: String },
    /// Run an arbitrary command
    Command { program: String, args: Vec<String> },
    /// Alert only
    None,
}

impl RemediationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationKind::SystemdRestart { .. } => "systemd",
            RemediationKind::ContainerRestart { .. } => "container",
            RemediationKind::Command { .. } => "command",
            RemediationKind::None => "none",
        }
    }

    /// Build a remediation kind; `target` defaults to the service name
    pub fn parse(kind: &str, target: Option<&str>, service_name: &str) -> Result<Self, String> {
        let target = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(service_name)
            .to_string();

        match kind {
            "systemd" | "os_service" => Ok(RemediationKind::SystemdRestart { unit: target }),
            "container" | "deploy" => Ok(RemediationKind::ContainerRestart { service: target }),
            "command" => {
                let mut parts = target.split_whitespace().map(str::to_string);
                let program = parts
                    .next()
                    .ok_or_else(|| "command remediation requires a command line".to_string())?;
                Ok(RemediationKind::Command {
                    program,
                    args: parts.collect(),
                })
            }
            "none" => Ok(RemediationKind::None),
            other => Err(format!("unknown remediation kind '{}'", other)),
        }
    }
}

/// Notification channel a service's alerts are fanned out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Log,
    Email,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Log => "log",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(ChannelKind::Log),
            "email" | "mail" => Ok(ChannelKind::Email),
            "webhook" | "chat" => Ok(ChannelKind::Webhook),
            other => Err(format!("unknown alert channel '{}'", other)),
        }
    }
}

/// Immutable description of one monitored service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub probe: ProbeKind,
    pub remediation: RemediationKind,
    pub channels: Vec<ChannelKind>,
    /// Hard timeout for one probe
    pub timeout: Duration,
    /// Alert suppression and remediation attempt window
    pub cooldown: Duration,
    /// Remediation attempts allowed per cool-down window
    pub max_attempts: u32,
}
