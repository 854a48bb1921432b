use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use warden::cli::{self, Cli, Commands};
use warden::config::AppConfig;
use warden::coordination::Shutdown;
use warden::domain::CycleReport;
use warden::error::{Result, WardenError};
use warden::persistence::{CycleLock, StateStore};
use warden::probes;
use warden::supervisor::SupervisorLoop;

use crate::main_runtime::{build_registry, build_supervisor};

/// 0 ok, 2 another cycle holds the lock, 1 anything else
pub(crate) fn exit_code(err: &WardenError) -> ExitCode {
    match err {
        WardenError::CycleInProgress => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

pub(crate) async fn run(cli: &Cli, config: &AppConfig) -> Result<ExitCode> {
    match cli.command() {
        Commands::Run => run_once(cli, config).await,
        Commands::Watch { interval } => run_watch(cli, config, interval).await,
        Commands::Check { service } => run_check(cli, config, &service).await,
        Commands::Status => run_status(cli, config),
        Commands::Validate => run_validate(cli, config),
    }
}

fn emit_report(cli: &Cli, report: &CycleReport) -> Result<()> {
    let line = report.to_json_line()?;
    info!(target: "warden::report", "{}", line);

    if cli.json {
        println!("{}", line);
    } else {
        print!("{}", report.render_summary());
    }
    Ok(())
}

async fn cycle_and_save(supervisor: &SupervisorLoop, store: &StateStore) -> Result<CycleReport> {
    let report = supervisor.run_cycle().await?;
    store.save(&supervisor.snapshot_states().await)?;
    Ok(report)
}

/// Build the loop from state read under the cycle lock; the lock is held
/// until the returned guard drops
async fn prepare(config: &AppConfig) -> Result<(SupervisorLoop, StateStore, CycleLock)> {
    let registry = build_registry(config)?;
    let store = StateStore::new(config.supervisor.state_file_path());
    let (lock, persisted) = store.lock_and_load()?;

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let supervisor = build_supervisor(config, registry, shutdown)?.with_states(persisted.services);
    Ok((supervisor, store, lock))
}

async fn run_once(cli: &Cli, config: &AppConfig) -> Result<ExitCode> {
    let (supervisor, store, _lock) = prepare(config).await?;

    let report = cycle_and_save(&supervisor, &store).await?;
    emit_report(cli, &report)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_watch(cli: &Cli, config: &AppConfig, interval_secs: u64) -> Result<ExitCode> {
    let (supervisor, store, _lock) = prepare(config).await?;
    let interval = Duration::from_secs(interval_secs.max(1));
    info!("Watching {} services every {}s", supervisor.registry().len(), interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = supervisor.shutdown().wait() => break,
        }

        match cycle_and_save(&supervisor, &store).await {
            Ok(report) => emit_report(cli, &report)?,
            Err(e) => error!("Cycle failed: {}", e),
        }

        if supervisor.shutdown().is_requested() {
            break;
        }
    }

    info!("Watch stopped");
    Ok(ExitCode::SUCCESS)
}

async fn run_check(cli: &Cli, config: &AppConfig, service: &str) -> Result<ExitCode> {
    let registry = build_registry(config)?;
    let entry = registry.entry(service)?;
    let descriptor = &entry.descriptor;
    let outcome = probes::check(entry.probe.as_ref(), descriptor, descriptor.timeout).await;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "service": service,
                "status": outcome.status,
                "latency_ms": outcome.latency_ms(),
                "detail": outcome.detail,
            })
        );
    } else {
        println!("{}", cli::render_probe(service, &outcome));
    }

    Ok(if outcome.status.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_status(cli: &Cli, config: &AppConfig) -> Result<ExitCode> {
    let store = StateStore::new(config.supervisor.state_file_path());
    let persisted = store.load()?;

    if cli.json {
        println!("{}", serde_json::to_string(&persisted)?);
    } else {
        match persisted.updated_at {
            Some(at) => println!("State as of {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("No cycle has completed yet ({})", store.path().display()),
        }
        println!("{}", cli::render_states(&persisted.services));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate(cli: &Cli, config: &AppConfig) -> Result<ExitCode> {
    let registry = build_registry(config)?;
    for name in registry.names() {
        if let Ok(entry) = registry.entry(name) {
            info!(
                "{}: probe={} remediation={} channels={:?}",
                name,
                entry.probe.kind(),
                entry.action.kind(),
                entry.descriptor.channels
            );
        }
    }

    if !config.resources.enabled {
        warn!("Resource sampling is disabled");
    }

    println!(
        "Configuration OK: {} services ({})",
        registry.len(),
        cli.config.display()
    );
    Ok(ExitCode::SUCCESS)
}
