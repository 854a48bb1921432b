use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Default hard timeout per probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Default alert suppression / remediation window in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Default remediation attempts per cool-down window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between remediation and the verification probe
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Worker pool size for the initial probe pass
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Hard timeout for one remediation invocation
    #[serde(default = "default_remediation_timeout")]
    pub remediation_timeout_secs: u64,
    /// Where ServiceState is kept between invocations
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_cooldown() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

fn default_max_concurrency() -> usize {
    5
}

fn default_remediation_timeout() -> u64 {
    120
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            cooldown_secs: default_cooldown(),
            max_attempts: default_max_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
            max_concurrency: default_max_concurrency(),
            remediation_timeout_secs: default_remediation_timeout(),
            state_file: None,
        }
    }
}

impl SupervisorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn remediation_timeout(&self) -> Duration {
        Duration::from_secs(self.remediation_timeout_secs)
    }

    /// Configured state file, or one under the user's state directory
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("warden")
                .join("state.json")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    /// Alert recipient address; absence disables the email channel
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Use STARTTLS against the relay
    #[serde(default)]
    pub smtp_starttls: bool,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Chat webhook URL; absence disables the webhook channel
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Per-channel send timeout
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
}

fn default_email_from() -> String {
    "warden@localhost".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_channel_timeout() -> u64 {
    10
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            email_to: None,
            email_from: default_email_from(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_starttls: false,
            smtp_username: None,
            smtp_password: None,
            webhook_url: None,
            channel_timeout_secs: default_channel_timeout(),
        }
    }
}

impl AlertingConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Sample host utilization each cycle
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Filesystem whose usage is reported
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,
}

fn default_true() -> bool {
    true
}

fn default_mount_point() -> PathBuf {
    PathBuf::from("/")
}

fn default_warning_percent() -> f64 {
    80.0
}

fn default_critical_percent() -> f64 {
    90.0
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount_point: default_mount_point(),
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Command prefix used to restart a managed container; the service
    /// name is appended as the last argument
    #[serde(default = "default_restart_command")]
    pub restart_command: Vec<String>,
}

fn default_restart_command() -> Vec<String> {
    ["docker", "compose", "-f", "docker-compose.prod.yml", "restart"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            restart_command: default_restart_command(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the rolling log file (also the persistent alert log)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

/// One registry entry as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Probe kind: http, process, tcp, systemd
    pub probe: String,
    /// URL, process signature, host:port or unit name
    pub target: String,
    /// HTTP method for http probes
    #[serde(default)]
    pub method: Option<String>,
    /// Remediation kind: systemd, container, command, none
    #[serde(default = "default_remediation")]
    pub remediation: String,
    /// Unit, container service or command line; defaults to the name
    #[serde(default)]
    pub remediation_target: Option<String>,
    /// Alert channels beyond the always-on log channel
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_remediation() -> String {
    "none".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/warden.toml")
    }

    /// Load configuration from a specific file (optional) plus environment
    pub fn load_from<P: AsRef<Path>>(config_file: P) -> Result<Self, ConfigError> {
        let config_file = config_file.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file
            .add_source(File::from(config_file).required(false))
            // Override with environment variables (WARDEN_ALERTING__WEBHOOK_URL, etc.)
            .add_source(
                Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.services.is_empty() {
            errors.push("no services configured".to_string());
        }

        if self.supervisor.max_concurrency == 0 {
            errors.push("supervisor.max_concurrency must be at least 1".to_string());
        }

        if self.supervisor.probe_timeout_secs == 0 {
            errors.push("supervisor.probe_timeout_secs must be positive".to_string());
        }

        if self.supervisor.max_attempts == 0 {
            errors.push("supervisor.max_attempts must be at least 1".to_string());
        }

        for svc in &self.services {
            if svc.timeout_secs == Some(0) {
                errors.push(format!("service '{}': timeout_secs must be positive", svc.name));
            }
            if svc.max_attempts == Some(0) {
                errors.push(format!("service '{}': max_attempts must be at least 1", svc.name));
            }
        }

        if let Some(ref url) = self.alerting.webhook_url {
            if let Err(e) = url::Url::parse(url) {
                errors.push(format!("alerting.webhook_url is invalid: {}", e));
            }
        }

        if let Some(ref to) = self.alerting.email_to {
            if !to.contains('@') {
                errors.push(format!("alerting.email_to '{}' is not an address", to));
            }
        }

        if self.resources.warning_percent > self.resources.critical_percent {
            errors.push("resources.warning_percent must not exceed critical_percent".to_string());
        }

        if self.deployment.restart_command.is_empty() {
            errors.push("deployment.restart_command must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[supervisor]
cooldown_secs = 60
max_attempts = 2
settle_delay_ms = 0

[alerting]
email_to = "ops@example.com"

[[services]]
name = "api"
probe = "http"
target = "http://127.0.0.1:8000/health"
remediation = "container"
channels = ["email", "webhook"]
timeout_secs = 2

[[services]]
name = "nginx"
probe = "systemd"
target = "nginx"
remediation = "systemd"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load_from(file.path()).unwrap();

        assert_eq!(config.supervisor.cooldown_secs, 60);
        assert_eq!(config.supervisor.max_attempts, 2);
        assert_eq!(config.supervisor.max_concurrency, 5);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].timeout_secs, Some(2));
        assert_eq!(config.services[1].remediation, "systemd");
        assert_eq!(config.alerting.email_to.as_deref(), Some("ops@example.com"));
        assert!(config.alerting.webhook_url.is_none());
        assert!(config.resources.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let file = write_config(
            r#"
[supervisor]
max_concurrency = 0
max_attempts = 0

[alerting]
webhook_url = "not a url"
"#,
        );
        let config = AppConfig::load_from(file.path()).unwrap();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("no services")));
        assert!(errors.iter().any(|e| e.contains("max_concurrency")));
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("webhook_url")));
    }

    #[test]
    fn test_default_restart_command() {
        let deployment = DeploymentConfig::default();
        assert_eq!(deployment.restart_command[0], "docker");
        assert_eq!(deployment.restart_command.last().unwrap(), "restart");
    }
}
