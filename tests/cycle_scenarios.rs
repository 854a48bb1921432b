//! End-to-end cycles over real HTTP probes, config loading and the state
//! file, with a fake deployment collaborator.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use warden::adapters::DeploymentHandle;
use warden::config::AppConfig;
use warden::domain::{HealthStatus, ServiceStatus, Severity};
use warden::error::WardenError;
use warden::persistence::StateStore;
use warden::probes;
use warden::registry::ServiceRegistry;
use warden::supervisor::SupervisorLoop;

const HEALTHY: u8 = 0;
const FAILING: u8 = 1;
const HANGING: u8 = 2;

/// Health endpoint whose behavior is switched through `mode`
async fn health_server(mode: Arc<AtomicU8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mode = mode.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let status = match mode.load(Ordering::SeqCst) {
                    HEALTHY => "200 OK",
                    HANGING => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        "200 OK"
                    }
                    _ => "503 Service Unavailable",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{}/health", addr)
}

/// Counts restarts; each restart moves the endpoint to the next scripted mode
struct FakeDeployment {
    restarts: AtomicU32,
    mode: Arc<AtomicU8>,
    after_restart: Mutex<VecDeque<u8>>,
}

impl FakeDeployment {
    fn new(mode: Arc<AtomicU8>, after_restart: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            restarts: AtomicU32::new(0),
            mode,
            after_restart: Mutex::new(after_restart.iter().copied().collect()),
        })
    }

    fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentHandle for FakeDeployment {
    async fn restart(&self, _service: &str) -> Result<(), String> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.after_restart.lock().unwrap().pop_front() {
            self.mode.store(next, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: AppConfig,
    store: StateStore,
}

/// `api` over HTTP: timeout 1s, cool-down 60s, max attempts 2
fn fixture(url: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let config_path = dir.path().join("warden.toml");

    let mut file = std::fs::File::create(&config_path).unwrap();
    write!(
        file,
        r#"
[supervisor]
cooldown_secs = 60
max_attempts = 2
settle_delay_ms = 0
state_file = "{state}"

[resources]
enabled = false

[[services]]
name = "api"
probe = "http"
target = "{url}"
remediation = "container"
timeout_secs = 1
"#,
        state = state_file.display(),
        url = url
    )
    .unwrap();

    let config = AppConfig::load_from(&config_path).unwrap();
    config.validate().unwrap();
    let store = StateStore::new(config.supervisor.state_file_path());

    Fixture {
        _dir: dir,
        config,
        store,
    }
}

/// One process invocation: load state, run one cycle, save state
async fn invoke(
    fixture: &Fixture,
    deployment: Arc<FakeDeployment>,
) -> warden::domain::CycleReport {
    let (_lock, persisted) = fixture.store.lock_and_load().unwrap();
    let registry = Arc::new(ServiceRegistry::from_config(&fixture.config, deployment).unwrap());
    let http = probes::http_client().unwrap();
    let supervisor = SupervisorLoop::from_config(&fixture.config, registry, &http)
        .unwrap()
        .with_states(persisted.services);

    let report = supervisor.run_cycle().await.unwrap();
    fixture
        .store
        .save(&supervisor.snapshot_states().await)
        .unwrap();
    report
}

#[tokio::test]
async fn test_timeout_then_recovery_across_invocations() {
    let mode = Arc::new(AtomicU8::new(HANGING));
    let url = health_server(mode.clone()).await;
    let fixture = fixture(&url);
    // First restart leaves it failing, second fixes it
    let deployment = FakeDeployment::new(mode.clone(), &[FAILING, HEALTHY]);

    let first = invoke(&fixture, deployment.clone()).await;
    let api = first.outcome("api").unwrap();
    assert_eq!(api.probe_status, HealthStatus::Unknown);
    assert_eq!(api.final_status, ServiceStatus::Unhealthy);
    assert_eq!(api.consecutive_failures, 1);
    assert_eq!(api.alerts_dispatched(), 1);
    assert_eq!(deployment.restarts(), 1);

    let second = invoke(&fixture, deployment.clone()).await;
    let api = second.outcome("api").unwrap();
    assert_eq!(api.probe_status, HealthStatus::Unhealthy);
    assert_eq!(api.alerts_dispatched(), 0);
    assert_eq!(api.final_status, ServiceStatus::Healthy);
    assert_eq!(api.consecutive_failures, 0);
    assert!(api.recovered);
    assert_eq!(deployment.restarts(), 2);

    let persisted = fixture.store.load().unwrap();
    assert_eq!(persisted.services["api"].status, ServiceStatus::Healthy);
    assert_eq!(persisted.services["api"].attempts_in_window, 0);
}

#[tokio::test]
async fn test_exhausted_attempts_escalate_to_critical() {
    let mode = Arc::new(AtomicU8::new(FAILING));
    let url = health_server(mode.clone()).await;
    let fixture = fixture(&url);
    let deployment = FakeDeployment::new(mode.clone(), &[]);

    invoke(&fixture, deployment.clone()).await;
    invoke(&fixture, deployment.clone()).await;
    let third = invoke(&fixture, deployment.clone()).await;

    let api = third.outcome("api").unwrap();
    assert_eq!(api.final_status, ServiceStatus::Critical);
    assert!(api.remediation.as_ref().unwrap().is_rate_limited());
    assert_eq!(deployment.restarts(), 2);

    let critical: Vec<_> = api
        .alerts
        .iter()
        .filter(|a| a.severity == Severity::Critical && !a.suppressed)
        .collect();
    assert_eq!(critical.len(), 1);

    let line = third.to_json_line().unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["outcomes"][0]["final_status"], "critical");

    // Recovers once the endpoint comes back
    mode.store(HEALTHY, Ordering::SeqCst);
    let fourth = invoke(&fixture, deployment.clone()).await;
    let api = fourth.outcome("api").unwrap();
    assert_eq!(api.final_status, ServiceStatus::Healthy);
    assert!(api.recovered);
    assert_eq!(deployment.restarts(), 2);
}

#[tokio::test]
async fn test_concurrent_invocation_is_rejected() {
    let mode = Arc::new(AtomicU8::new(HEALTHY));
    let url = health_server(mode).await;
    let fixture = fixture(&url);

    let _held = fixture.store.lock().unwrap();
    if cfg!(unix) {
        assert!(matches!(
            fixture.store.lock(),
            Err(WardenError::CycleInProgress)
        ));
    }
}
