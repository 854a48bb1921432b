//! Remediation actions and the rate-limited executor

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::adapters::{run_command, DeploymentHandle};
use crate::domain::{RemediationKind, RemediationResult, ServiceState};
use crate::error::RemediationError;
use crate::registry::RegisteredService;

/// A corrective action bound to one service.
///
/// Success means the action was invoked without error, not that the service
/// recovered; recovery is established by the next probe.
#[async_trait]
pub trait RemediationAction: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn execute(&self, service: &str) -> Result<(), RemediationError>;

    /// False for alert-only services; they are never remediated or escalated
    fn is_configured(&self) -> bool {
        true
    }
}

/// `systemctl restart <unit>`
pub struct SystemdRestart {
    unit: String,
}

impl SystemdRestart {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
        }
    }
}

#[async_trait]
impl RemediationAction for SystemdRestart {
    fn kind(&self) -> &'static str {
        "systemd"
    }

    async fn execute(&self, _service: &str) -> Result<(), RemediationError> {
        let args = vec!["restart".to_string(), self.unit.clone()];
        run_command("systemctl", &args)
            .await
            .map_err(RemediationError::Invocation)
    }
}

/// Restart a managed container through the deployment collaborator
pub struct ContainerRestart {
    service: String,
    deployment: Arc<dyn DeploymentHandle>,
}

impl ContainerRestart {
    pub fn new(service: &str, deployment: Arc<dyn DeploymentHandle>) -> Self {
        Self {
            service: service.to_string(),
            deployment,
        }
    }
}

#[async_trait]
impl RemediationAction for ContainerRestart {
    fn kind(&self) -> &'static str {
        "container"
    }

    async fn execute(&self, _service: &str) -> Result<(), RemediationError> {
        self.deployment
            .restart(&self.service)
            .await
            .map_err(RemediationError::Invocation)
    }
}

/// Run an arbitrary command line
pub struct CommandAction {
    program: String,
    args: Vec<String>,
}

impl CommandAction {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl RemediationAction for CommandAction {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn execute(&self, _service: &str) -> Result<(), RemediationError> {
        run_command(&self.program, &self.args)
            .await
            .map_err(RemediationError::Invocation)
    }
}

/// Alert-only
#[derive(Debug, Default)]
pub struct NoRemediation;

#[async_trait]
impl RemediationAction for NoRemediation {
    fn kind(&self) -> &'static str {
        "none"
    }

    async fn execute(&self, _service: &str) -> Result<(), RemediationError> {
        Err(RemediationError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Instantiate the action for a configured remediation kind
pub fn action_for(
    kind: &RemediationKind,
    deployment: Arc<dyn DeploymentHandle>,
) -> Arc<dyn RemediationAction> {
    match kind {
        RemediationKind::SystemdRestart { unit } => Arc::new(SystemdRestart::new(unit)),
        RemediationKind::ContainerRestart { service } => {
            Arc::new(ContainerRestart::new(service, deployment))
        }
        RemediationKind::Command { program, args } => {
            Arc::new(CommandAction::new(program, args.clone()))
        }
        RemediationKind::None => Arc::new(NoRemediation),
    }
}

/// Runs remediation actions under the per-service attempt cap
#[derive(Debug, Clone)]
pub struct RemediationExecutor {
    timeout: Duration,
}

impl RemediationExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Attempt remediation of `entry`.
    ///
    /// Reserves an attempt on `state` first; when the window's attempts are
    /// used up nothing is invoked and the result carries `RateLimited`.
    /// The caller must hold the service's state lock for the whole call.
    pub async fn remediate(
        &self,
        entry: &RegisteredService,
        state: &mut ServiceState,
        now: DateTime<Utc>,
    ) -> RemediationResult {
        let name = entry.name();
        if !entry.action.is_configured() {
            return RemediationResult::not_attempted(RemediationError::NotConfigured);
        }

        let descriptor = &entry.descriptor;
        let attempt =
            match state.begin_remediation(now, descriptor.cooldown, descriptor.max_attempts) {
                Ok(attempt) => attempt,
                Err(e) => {
                    warn!("Not remediating {}: {}", name, e);
                    return RemediationResult::not_attempted(e);
                }
            };

        info!(
            "Remediating {} via {} (attempt {}/{})",
            name,
            entry.action.kind(),
            attempt,
            descriptor.max_attempts
        );

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, entry.action.execute(name)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                info!("Remediation of {} invoked in {}ms", name, duration_ms);
                RemediationResult::succeeded(attempt, duration_ms)
            }
            Ok(Err(e)) => {
                error!("Remediation of {} failed: {}", name, e);
                RemediationResult::failed(attempt, e, duration_ms)
            }
            Err(_) => {
                let e = RemediationError::Timeout {
                    elapsed_ms: self.timeout.as_millis() as u64,
                };
                error!("Remediation of {} failed: {}", name, e);
                RemediationResult::failed(attempt, e, duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockDeploymentHandle;
    use crate::domain::{ProbeKind, ServiceDescriptor};
    use crate::probes::TcpProbe;

    fn entry(action: Arc<dyn RemediationAction>, max_attempts: u32) -> RegisteredService {
        RegisteredService::new(
            ServiceDescriptor {
                name: "api".to_string(),
                probe: ProbeKind::Tcp {
                    address: "127.0.0.1:1".to_string(),
                },
                remediation: RemediationKind::ContainerRestart {
                    service: "api".to_string(),
                },
                channels: Vec::new(),
                timeout: Duration::from_secs(2),
                cooldown: Duration::from_secs(60),
                max_attempts,
            },
            Arc::new(TcpProbe::new("127.0.0.1:1")),
            action,
        )
    }

    #[tokio::test]
    async fn test_container_restart_calls_deployment() {
        let mut deployment = MockDeploymentHandle::new();
        deployment
            .expect_restart()
            .withf(|service| service == "api-container")
            .times(1)
            .returning(|_| Ok(()));

        let action = action_for(
            &RemediationKind::ContainerRestart {
                service: "api-container".to_string(),
            },
            Arc::new(deployment),
        );
        assert_eq!(action.kind(), "container");
        assert!(action.execute("api").await.is_ok());
    }

    #[tokio::test]
    async fn test_attempts_are_capped() {
        let mut deployment = MockDeploymentHandle::new();
        deployment
            .expect_restart()
            .times(2)
            .returning(|_| Err("compose exited with 1".to_string()));

        let entry = entry(Arc::new(ContainerRestart::new("api", Arc::new(deployment))), 2);
        let executor = RemediationExecutor::new(Duration::from_secs(5));
        let mut state = ServiceState::new();
        let now = Utc::now();

        let first = executor.remediate(&entry, &mut state, now).await;
        assert!(first.attempted);
        assert_eq!(first.attempt, 1);
        assert!(matches!(first.error, Some(RemediationError::Invocation(_))));

        let second = executor.remediate(&entry, &mut state, now).await;
        assert_eq!(second.attempt, 2);

        let third = executor.remediate(&entry, &mut state, now).await;
        assert!(!third.attempted);
        assert!(third.is_rate_limited());
    }

    #[tokio::test]
    async fn test_unconfigured_never_attempts() {
        let entry = entry(Arc::new(NoRemediation), 2);
        let executor = RemediationExecutor::new(Duration::from_secs(5));
        let mut state = ServiceState::new();

        let result = executor.remediate(&entry, &mut state, Utc::now()).await;
        assert!(!result.attempted);
        assert_eq!(result.error, Some(RemediationError::NotConfigured));
        assert_eq!(state.attempts_in_window, 0);
    }

    struct HangingAction;

    #[async_trait]
    impl RemediationAction for HangingAction {
        fn kind(&self) -> &'static str {
            "command"
        }

        async fn execute(&self, _service: &str) -> Result<(), RemediationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let entry = entry(Arc::new(HangingAction), 2);
        let executor = RemediationExecutor::new(Duration::from_millis(50));
        let mut state = ServiceState::new();

        let result = executor.remediate(&entry, &mut state, Utc::now()).await;
        assert!(result.attempted);
        assert_eq!(result.error, Some(RemediationError::Timeout { elapsed_ms: 50 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_action_runs_program() {
        let action = action_for(
            &RemediationKind::Command {
                program: "false".to_string(),
                args: Vec::new(),
            },
            Arc::new(MockDeploymentHandle::new()),
        );
        let err = action.execute("api").await.unwrap_err();
        assert!(matches!(err, RemediationError::Invocation(_)));
    }
}
