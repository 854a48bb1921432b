use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use warden::adapters::ComposeDeployment;
use warden::config::{AppConfig, LoggingConfig};
use warden::coordination::Shutdown;
use warden::error::{Result, WardenError};
use warden::probes;
use warden::registry::ServiceRegistry;
use warden::supervisor::SupervisorLoop;

const LOG_FILE: &str = "warden.log";

fn default_directives(level: &str) -> String {
    if level.eq_ignore_ascii_case("info") {
        "info,warden=debug".to_string()
    } else {
        level.to_string()
    }
}

/// Colour console output only for an interactive stderr, and never when
/// `NO_COLOR` is set
fn use_ansi(stderr_is_terminal: bool, no_color: bool) -> bool {
    stderr_is_terminal && !no_color
}

fn console_ansi() -> bool {
    use_ansi(
        std::io::stderr().is_terminal(),
        std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()),
    )
}

/// Console logging on stderr plus a daily rolling file. The returned guard
/// must be held until exit so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    // Prefer WARDEN_LOG_DIR, then logging.dir, then /var/log/warden
    let log_dir = std::env::var("WARDEN_LOG_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(|| config.dir.clone())
        .unwrap_or_else(|| PathBuf::from("/var/log/warden"));

    // `rolling::daily` panics if it can't create the initial file, so
    // preflight writability
    let mut guard = None;
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = log_dir.join(".warden_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
                let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir.display(),
                    e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir.display()
        );
        None
    };

    // Stdout is reserved for reports
    let (console_text, console_json) = if config.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(console_ansi())
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_text)
        .with(console_json)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        tracing::debug!("Logging to {}/{}", log_dir.display(), LOG_FILE);
    }

    guard
}

/// Minimal logging for read-only commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(console_ansi())
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Load and validate configuration; every problem is reported at once
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(path)?;
    config
        .validate()
        .map_err(|errors| WardenError::ConfigInvalid(errors.join("; ")))?;
    Ok(config)
}

pub fn build_registry(config: &AppConfig) -> Result<Arc<ServiceRegistry>> {
    let deployment = Arc::new(ComposeDeployment::from_config(&config.deployment));
    Ok(Arc::new(ServiceRegistry::from_config(config, deployment)?))
}

pub fn build_supervisor(
    config: &AppConfig,
    registry: Arc<ServiceRegistry>,
    shutdown: Shutdown,
) -> Result<SupervisorLoop> {
    let http = probes::http_client()?;
    Ok(SupervisorLoop::from_config(config, registry, &http)?.with_shutdown(shutdown))
}
