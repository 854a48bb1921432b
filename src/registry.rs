//! Static service catalog
//!
//! Maps each monitored service name to its descriptor plus one probe and one
//! remediation instance. Built once at startup and read-only afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::DeploymentHandle;
use crate::config::{AppConfig, ServiceConfig, SupervisorConfig};
use crate::domain::{ChannelKind, ProbeKind, RemediationKind, ServiceDescriptor};
use crate::error::{Result, WardenError};
use crate::probes::{self, Probe};
use crate::supervisor::remediation::{self, RemediationAction};

/// A registry entry: descriptor bound to its probe and remediation instances
#[derive(Clone)]
pub struct RegisteredService {
    pub descriptor: Arc<ServiceDescriptor>,
    pub probe: Arc<dyn Probe>,
    pub action: Arc<dyn RemediationAction>,
}

impl std::fmt::Debug for RegisteredService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredService")
            .field("descriptor", &self.descriptor)
            .field("probe", &self.probe.kind())
            .field("action", &self.action.kind())
            .finish()
    }
}

impl RegisteredService {
    pub fn new(
        descriptor: ServiceDescriptor,
        probe: Arc<dyn Probe>,
        action: Arc<dyn RemediationAction>,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            probe,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Read-only catalog of monitored services, in configuration order
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<RegisteredService>,
    index: HashMap<String, usize>,
}

impl ServiceRegistry {
    /// Build from pre-constructed entries; names must be unique
    pub fn new(entries: Vec<RegisteredService>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.name().to_string(), i).is_some() {
                return Err(WardenError::ConfigInvalid(format!(
                    "duplicate service name '{}'",
                    entry.name()
                )));
            }
        }
        Ok(Self { entries, index })
    }

    /// Build the registry from configuration, creating probe and remediation
    /// instances for each entry
    pub fn from_config(config: &AppConfig, deployment: Arc<dyn DeploymentHandle>) -> Result<Self> {
        let http = probes::http_client()?;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(config.services.len());

        for svc in &config.services {
            if !seen.insert(svc.name.as_str()) {
                return Err(WardenError::ConfigInvalid(format!(
                    "duplicate service name '{}'",
                    svc.name
                )));
            }

            let descriptor = descriptor_from_config(svc, &config.supervisor)
                .map_err(|e| WardenError::ConfigInvalid(format!("service '{}': {}", svc.name, e)))?;

            for channel in &descriptor.channels {
                let configured = match channel {
                    ChannelKind::Log => true,
                    ChannelKind::Email => config.alerting.email_to.is_some(),
                    ChannelKind::Webhook => config.alerting.webhook_url.is_some(),
                };
                if !configured {
                    warn!(
                        "Service {} binds {} channel but it is not configured; channel disabled",
                        descriptor.name, channel
                    );
                }
            }

            let probe = probes::probe_for(&descriptor.probe, &http);
            let action = remediation::action_for(&descriptor.remediation, deployment.clone());
            debug!(
                "Registered service {} (probe={}, remediation={})",
                descriptor.name,
                descriptor.probe.as_str(),
                descriptor.remediation.as_str()
            );
            entries.push(RegisteredService::new(descriptor, probe, action));
        }

        Self::new(entries)
    }

    /// Look up a service descriptor by name
    pub fn resolve(&self, name: &str) -> Result<Arc<ServiceDescriptor>> {
        self.entry(name).map(|e| e.descriptor.clone())
    }

    /// Look up the full entry by name
    pub fn entry(&self, name: &str) -> Result<&RegisteredService> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| WardenError::NotFound(name.to_string()))
    }

    pub fn entries(&self) -> &[RegisteredService] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(RegisteredService::name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turn one config entry into a descriptor, applying supervisor defaults
pub fn descriptor_from_config(
    svc: &ServiceConfig,
    defaults: &SupervisorConfig,
) -> std::result::Result<ServiceDescriptor, String> {
    let name = svc.name.trim();
    if name.is_empty() {
        return Err("service name must not be empty".to_string());
    }

    let probe = ProbeKind::parse(svc.probe.trim(), &svc.target, svc.method.as_deref())?;
    let remediation = RemediationKind::parse(
        svc.remediation.trim(),
        svc.remediation_target.as_deref(),
        name,
    )?;

    // Log channel is always bound
    let mut channels = vec![ChannelKind::Log];
    for raw in &svc.channels {
        let channel: ChannelKind = raw.parse()?;
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    Ok(ServiceDescriptor {
        name: name.to_string(),
        probe,
        remediation,
        channels,
        timeout: Duration::from_secs(svc.timeout_secs.unwrap_or(defaults.probe_timeout_secs)),
        cooldown: Duration::from_secs(svc.cooldown_secs.unwrap_or(defaults.cooldown_secs)),
        max_attempts: svc.max_attempts.unwrap_or(defaults.max_attempts),
    })
}
