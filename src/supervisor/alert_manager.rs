//! Alert dispatcher
//!
//! Fans one alert out to the channels bound to a service. Stateless with
//! respect to deduplication: the caller decides suppression from the
//! service's last-alert timestamp before dispatching.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::channels::{AlertChannel, LogChannel};
use crate::adapters::{EmailChannel, WebhookChannel};
use crate::config::AlertingConfig;
use crate::domain::{AlertEvent, ChannelDelivery, ChannelKind, DeliveryStatus};
use crate::error::{ChannelError, Result};

/// Per-channel results of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchResult {
    pub deliveries: Vec<ChannelDelivery>,
}

impl DispatchResult {
    pub fn delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.status.is_delivered())
            .count()
    }
}

/// Sends still in flight after `dispatch` returned
pub struct PendingDispatch {
    completed: Vec<ChannelDelivery>,
    in_flight: Vec<(ChannelKind, JoinHandle<DeliveryStatus>)>,
}

impl PendingDispatch {
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for outstanding sends; each is already bounded by the channel
    /// timeout
    pub async fn finish(self) -> DispatchResult {
        let mut deliveries = self.completed;
        for (channel, handle) in self.in_flight {
            let status = match handle.await {
                Ok(status) => status,
                Err(e) => DeliveryStatus::Failed(format!("send task failed: {}", e)),
            };
            deliveries.push(ChannelDelivery { channel, status });
        }
        deliveries.sort_by_key(|d| d.channel);
        DispatchResult { deliveries }
    }
}

fn delivery_status(result: std::result::Result<(), ChannelError>) -> DeliveryStatus {
    match result {
        Ok(()) => DeliveryStatus::Delivered,
        Err(ChannelError::Timeout { .. }) => DeliveryStatus::TimedOut,
        Err(ChannelError::Delivery { reason, .. }) => DeliveryStatus::Failed(reason),
    }
}

/// Routes alerts to configured channels
pub struct AlertDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn AlertChannel>>,
    channel_timeout: Duration,
}

impl AlertDispatcher {
    /// Dispatcher with only the log channel
    pub fn new(channel_timeout: Duration) -> Self {
        let mut channels: HashMap<ChannelKind, Arc<dyn AlertChannel>> = HashMap::new();
        channels.insert(ChannelKind::Log, Arc::new(LogChannel));
        Self {
            channels,
            channel_timeout,
        }
    }

    /// Register (or replace) a channel under its kind
    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    /// Log channel plus whichever of email and webhook are configured
    pub fn from_config(config: &AlertingConfig, http: &reqwest::Client) -> Result<Self> {
        let mut dispatcher = Self::new(config.channel_timeout());

        if let Some(email) = EmailChannel::from_config(config)? {
            dispatcher = dispatcher.with_channel(Arc::new(email));
        }
        if let Some(ref url) = config.webhook_url {
            dispatcher =
                dispatcher.with_channel(Arc::new(WebhookChannel::new(http.clone(), url.clone())));
        }

        Ok(dispatcher)
    }

    pub fn is_configured(&self, channel: ChannelKind) -> bool {
        self.channels.contains_key(&channel)
    }

    /// True when an alert of the same severity was sent within the cool-down
    pub fn is_suppressed(
        last_sent: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        last_sent.is_some_and(|last| {
            now.signed_duration_since(last)
                .to_std()
                .map(|elapsed| elapsed < cooldown)
                .unwrap_or(true)
        })
    }

    /// Start sending `event` to `channels`.
    ///
    /// The log channel completes inline; network channels run as spawned
    /// tasks bounded by the channel timeout, so this returns without waiting
    /// on them. Unconfigured channels are reported as disabled.
    pub async fn dispatch(&self, event: &AlertEvent, channels: &[ChannelKind]) -> PendingDispatch {
        let mut pending = PendingDispatch {
            completed: Vec::new(),
            in_flight: Vec::new(),
        };

        for &kind in channels {
            let Some(channel) = self.channels.get(&kind).cloned() else {
                debug!("Channel {} not configured, skipping alert for {}", kind, event.service);
                pending.completed.push(ChannelDelivery {
                    channel: kind,
                    status: DeliveryStatus::Disabled,
                });
                continue;
            };

            if kind == ChannelKind::Log {
                let status = delivery_status(channel.send(event).await);
                pending.completed.push(ChannelDelivery {
                    channel: kind,
                    status,
                });
                continue;
            }

            let event = event.clone();
            let timeout = self.channel_timeout;
            let handle = tokio::spawn(async move {
                let result = match tokio::time::timeout(timeout, channel.send(&event)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChannelError::Timeout {
                        channel: kind.to_string(),
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                };
                if let Err(ref e) = result {
                    match e {
                        ChannelError::Timeout { .. } => warn!("{} (alert for {})", e, event.service),
                        _ => error!("{} (alert for {})", e, event.service),
                    }
                }
                delivery_status(result)
            });
            pending.in_flight.push((kind, handle));
        }

        pending
    }
}
