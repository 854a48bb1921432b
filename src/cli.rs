//! Command-line surface

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::domain::ServiceState;
use crate::probes::ProbeOutcome;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author = "Warden Team")]
#[command(version)]
#[command(about = "Service-health supervisor: probe, alert, remediate, verify", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, env = "WARDEN_CONFIG", default_value = "config/warden.toml", global = true)]
    pub config: PathBuf,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run exactly one monitoring cycle (default)
    Run,
    /// Run cycles at a fixed interval until interrupted
    Watch {
        /// Seconds between cycle starts
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },
    /// Probe one service without alerting or remediating
    Check {
        /// Service name as registered in the config
        service: String,
    },
    /// Show persisted per-service state
    Status,
    /// Load and validate configuration, then exit
    Validate,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "FAILURES")]
    failures: u32,
    #[tabled(rename = "ATTEMPTS")]
    attempts: u32,
    #[tabled(rename = "LAST REMEDIATION")]
    last_remediation: String,
    #[tabled(rename = "LAST CHECKED")]
    last_checked: String,
}

fn fmt_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Table of persisted service states
pub fn render_states(states: &BTreeMap<String, ServiceState>) -> String {
    if states.is_empty() {
        return "(no recorded state)".to_string();
    }

    let rows: Vec<StateRow> = states
        .iter()
        .map(|(name, s)| StateRow {
            service: name.clone(),
            status: s.status.to_string(),
            failures: s.consecutive_failures,
            attempts: s.attempts_in_window,
            last_remediation: fmt_time(s.last_remediation),
            last_checked: fmt_time(s.last_checked),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

/// One-line result of an ad-hoc probe
pub fn render_probe(service: &str, outcome: &ProbeOutcome) -> String {
    match outcome.detail {
        Some(ref detail) => format!(
            "{}: {} ({}ms) - {}",
            service,
            outcome.status,
            outcome.latency_ms(),
            detail
        ),
        None => format!("{}: {} ({}ms)", service, outcome.status, outcome.latency_ms()),
    }
}
