//! Outbound integrations: process execution, deployment tooling, mail relay
//! and chat webhooks.

pub mod command;
pub mod deployment;
pub mod email;
pub mod webhook;

pub use command::run_command;
pub use deployment::{ComposeDeployment, DeploymentHandle};
pub use email::EmailChannel;
pub use webhook::WebhookChannel;

#[cfg(test)]
pub use deployment::MockDeploymentHandle;
