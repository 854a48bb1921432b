//! Alert channel port and the always-on log channel

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::{AlertEvent, ChannelKind, Severity};
use crate::error::ChannelError;

/// One notification transport. Sends are best-effort; the dispatcher
/// bounds each call with its own timeout.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError>;
}

/// Writes alerts to the `warden::alerts` log target, which the rolling file
/// layer persists. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Log
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        match event.severity {
            Severity::Warning => warn!(
                target: "warden::alerts",
                service = %event.service,
                severity = %event.severity,
                "{}: {}",
                event.subject(),
                event.message
            ),
            Severity::Critical => error!(
                target: "warden::alerts",
                service = %event.service,
                severity = %event.severity,
                "{}: {}",
                event.subject(),
                event.message
            ),
        }
        Ok(())
    }
}
