//! Deployment collaborator used by container remediation

use async_trait::async_trait;
use tracing::info;

use super::command::run_command;
use crate::config::DeploymentConfig;

/// Restarts a managed container by service name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentHandle: Send + Sync {
    async fn restart(&self, service: &str) -> Result<(), String>;
}

/// Restarts containers through a compose-style CLI; the service name is
/// appended to the configured command
#[derive(Debug, Clone)]
pub struct ComposeDeployment {
    command: Vec<String>,
}

impl ComposeDeployment {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(config.restart_command.clone())
    }
}

#[async_trait]
impl DeploymentHandle for ComposeDeployment {
    async fn restart(&self, service: &str) -> Result<(), String> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| "deployment restart command is empty".to_string())?;

        let mut args = prefix.to_vec();
        args.push(service.to_string());

        info!("Restarting container {} via {}", service, program);
        run_command(program, &args).await
    }
}
