//! Supervisor loop
//!
//! Runs one monitoring cycle at a time: a bounded-concurrency probe pass over
//! every registered service, then for each failing service a strictly
//! sequential alert -> remediate -> settle -> verify sequence under that
//! service's state lock.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::alert_manager::{AlertDispatcher, PendingDispatch};
use super::remediation::RemediationExecutor;
use crate::config::AppConfig;
use crate::coordination::Shutdown;
use crate::domain::{
    AlertEvent, AlertRecord, CycleReport, ResourceSnapshot, ServiceDescriptor, ServiceOutcome,
    ServiceState, ServiceStatus, Severity,
};
use crate::error::{Result, WardenError};
use crate::probes::{self, ProbeOutcome};
use crate::registry::{RegisteredService, ServiceRegistry};
use crate::sampler::ResourceSampler;

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Alert sends still in flight for one outcome
struct PendingAlert {
    outcome: usize,
    alert: usize,
    dispatch: PendingDispatch,
}

pub struct SupervisorLoop {
    registry: Arc<ServiceRegistry>,
    dispatcher: AlertDispatcher,
    executor: RemediationExecutor,
    sampler: Option<ResourceSampler>,
    states: HashMap<String, Arc<Mutex<ServiceState>>>,
    settle_delay: Duration,
    max_concurrency: usize,
    cycle_guard: Mutex<()>,
    shutdown: Shutdown,
}

impl SupervisorLoop {
    /// Every registered service starts in `Unknown`
    pub fn new(
        registry: Arc<ServiceRegistry>,
        dispatcher: AlertDispatcher,
        executor: RemediationExecutor,
    ) -> Self {
        let states = registry
            .names()
            .map(|name| (name.to_string(), Arc::new(Mutex::new(ServiceState::new()))))
            .collect();

        Self {
            registry,
            dispatcher,
            executor,
            sampler: None,
            states,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cycle_guard: Mutex::new(()),
            shutdown: Shutdown::new(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        registry: Arc<ServiceRegistry>,
        http: &reqwest::Client,
    ) -> Result<Self> {
        let dispatcher = AlertDispatcher::from_config(&config.alerting, http)?;
        let executor = RemediationExecutor::new(config.supervisor.remediation_timeout());

        let mut supervisor = Self::new(registry, dispatcher, executor)
            .with_settle_delay(config.supervisor.settle_delay())
            .with_max_concurrency(config.supervisor.max_concurrency);

        if config.resources.enabled {
            supervisor = supervisor.with_sampler(ResourceSampler::from_config(&config.resources));
        }

        Ok(supervisor)
    }

    /// Seed state carried over from a previous invocation. Entries for
    /// services no longer registered are dropped.
    pub fn with_states(mut self, persisted: BTreeMap<String, ServiceState>) -> Self {
        for (name, state) in persisted {
            match self.states.get_mut(&name) {
                Some(slot) => *slot = Arc::new(Mutex::new(state)),
                None => debug!("Dropping persisted state for unregistered service {}", name),
            }
        }
        self
    }

    pub fn with_sampler(mut self, sampler: ResourceSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Current state of one service
    pub async fn state(&self, name: &str) -> Option<ServiceState> {
        match self.states.get(name) {
            Some(state) => Some(state.lock().await.clone()),
            None => None,
        }
    }

    /// Copy of every service's state, for persistence
    pub async fn snapshot_states(&self) -> BTreeMap<String, ServiceState> {
        let mut snapshot = BTreeMap::new();
        for (name, state) in &self.states {
            snapshot.insert(name.clone(), state.lock().await.clone());
        }
        snapshot
    }

    /// Probe one service without alerting, remediating or touching state
    pub async fn probe_service(&self, name: &str) -> Result<ProbeOutcome> {
        let entry = self.registry.entry(name)?;
        Ok(Self::probe_entry(entry).await)
    }

    async fn probe_entry(entry: &RegisteredService) -> ProbeOutcome {
        let descriptor = &entry.descriptor;
        probes::check(entry.probe.as_ref(), descriptor, descriptor.timeout).await
    }

    fn state_handle(&self, name: &str) -> Result<Arc<Mutex<ServiceState>>> {
        self.states
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::NotFound(name.to_string()))
    }

    /// Initial probe pass, bounded by the worker pool size, results in
    /// registry order
    async fn probe_all(&self) -> Vec<ProbeOutcome> {
        stream::iter(self.registry.entries())
            .map(|entry| Self::probe_entry(entry))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn sample_resources(&self) -> Option<ResourceSnapshot> {
        match self.sampler {
            Some(ref sampler) => Some(sampler.sample().await),
            None => None,
        }
    }

    /// Run exactly one monitoring cycle.
    ///
    /// Fails with `CycleInProgress` if another cycle on this loop has not
    /// finished.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| WardenError::CycleInProgress)?;

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Cycle {} starting ({} services)", cycle_id, self.registry.len());

        let (initial, resources) = tokio::join!(self.probe_all(), self.sample_resources());

        let mut outcomes = Vec::with_capacity(self.registry.len());
        let mut pending = Vec::new();

        for (entry, probe) in self.registry.entries().iter().zip(initial) {
            let (outcome, dispatches) = self.handle_service(entry, probe).await?;
            let index = outcomes.len();
            pending.extend(dispatches.into_iter().map(|(alert, dispatch)| PendingAlert {
                outcome: index,
                alert,
                dispatch,
            }));
            outcomes.push(outcome);
        }

        // Channels never block remediation; collect what they reported now
        for p in pending {
            let result = p.dispatch.finish().await;
            if let Some(record) = outcomes
                .get_mut(p.outcome)
                .and_then(|o| o.alerts.get_mut(p.alert))
            {
                record.deliveries = result.deliveries;
            }
        }

        let pressure = match (&self.sampler, &resources) {
            (Some(sampler), Some(snapshot)) => sampler.classify(snapshot),
            _ => Vec::new(),
        };
        for p in &pressure {
            warn!("Host {} at {:.1}% ({:?} threshold)", p.metric, p.value, p.level);
        }

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            resources,
            pressure,
        };

        info!(
            "Cycle {} finished in {}ms: {} healthy, {} critical, {} alerts, {} remediations",
            cycle_id,
            report.duration_ms(),
            report.count_status(ServiceStatus::Healthy),
            report.count_status(ServiceStatus::Critical),
            report.alerts_dispatched(),
            report.remediation_attempts()
        );

        Ok(report)
    }

    /// React to one service's initial probe result. Holds the service's
    /// state lock for the whole read-modify-write.
    async fn handle_service(
        &self,
        entry: &RegisteredService,
        probe: ProbeOutcome,
    ) -> Result<(ServiceOutcome, Vec<(usize, PendingDispatch)>)> {
        let name = entry.name();
        let descriptor = &entry.descriptor;
        let handle = self.state_handle(name)?;
        let mut state = handle.lock().await;
        let now = Utc::now();
        let mut dispatches = Vec::new();

        let mut outcome = ServiceOutcome {
            service: name.to_string(),
            probe_status: probe.status,
            final_status: state.status,
            latency_ms: probe.latency_ms(),
            consecutive_failures: state.consecutive_failures,
            detail: probe.detail.clone(),
            alerts: Vec::new(),
            remediation: None,
            recovered: false,
            remediation_skipped: false,
        };

        if probe.status.is_healthy() {
            outcome.recovered = state.record_healthy(now);
            if outcome.recovered {
                info!("{} recovered", name);
            }
        } else {
            let reason = probe
                .detail
                .clone()
                .unwrap_or_else(|| format!("probe reported {}", probe.status));
            warn!("{} is {}: {}", name, probe.status, reason);

            let warning = AlertEvent::warning(
                name,
                format!("{} probe reported {}: {}", descriptor.probe.as_str(), probe.status, reason),
            );
            if let Some(dispatch) = self
                .raise(&mut state, descriptor, warning, now, &mut outcome.alerts)
                .await
            {
                dispatches.push(dispatch);
            }

            if self.shutdown.is_requested() {
                warn!("Shutdown requested, not remediating {}", name);
                outcome.remediation_skipped = true;
                state.record_failure(now);
            } else {
                let result = self.executor.remediate(entry, &mut state, now).await;

                if result.attempted {
                    if !self.settle_delay.is_zero() {
                        tokio::time::sleep(self.settle_delay).await;
                    }
                    let verify = Self::probe_entry(entry).await;
                    let verified_at = Utc::now();
                    outcome.latency_ms = verify.latency_ms();
                    outcome.detail = verify.detail;

                    if verify.status.is_healthy() {
                        outcome.recovered = state.record_healthy(verified_at);
                        info!("{} verified healthy after remediation", name);
                    } else {
                        // A new window granted this attempt; attempts remain
                        if state.status == ServiceStatus::Critical {
                            state.demote_to_unhealthy();
                        }
                        state.record_failure(verified_at);
                        warn!(
                            "{} still {} after remediation attempt {}",
                            name, verify.status, result.attempt
                        );
                    }
                } else {
                    state.record_failure(now);

                    if result.is_rate_limited() {
                        state.escalate();
                        let critical = AlertEvent::critical(
                            name,
                            format!(
                                "{} remediation attempts within {}s cool-down did not restore the \
                                 service; manual intervention required",
                                state.attempts_in_window,
                                descriptor.cooldown.as_secs()
                            ),
                        );
                        if let Some(dispatch) = self
                            .raise(&mut state, descriptor, critical, now, &mut outcome.alerts)
                            .await
                        {
                            dispatches.push(dispatch);
                        }
                    }
                }

                outcome.remediation = Some(result);
            }
        }

        outcome.final_status = state.status;
        outcome.consecutive_failures = state.consecutive_failures;
        Ok((outcome, dispatches))
    }

    /// Dispatch an alert unless one of the same severity went out within the
    /// service's cool-down. Returns the alert's index with its in-flight sends.
    async fn raise(
        &self,
        state: &mut ServiceState,
        descriptor: &ServiceDescriptor,
        event: AlertEvent,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertRecord>,
    ) -> Option<(usize, PendingDispatch)> {
        let severity = event.severity;
        let index = alerts.len();

        if AlertDispatcher::is_suppressed(state.last_alert(severity), now, descriptor.cooldown) {
            debug!("Suppressed {} alert for {} (cool-down)", severity, event.service);
            alerts.push(AlertRecord {
                severity,
                suppressed: true,
                deliveries: Vec::new(),
            });
            return None;
        }

        state.record_alert(severity, now);
        let dispatch = self.dispatcher.dispatch(&event, &descriptor.channels).await;
        alerts.push(AlertRecord {
            severity,
            suppressed: false,
            deliveries: Vec::new(),
        });

        if severity == Severity::Critical {
            warn!("{} escalated to CRITICAL", event.service);
        }
        Some((index, dispatch))
    }
}
