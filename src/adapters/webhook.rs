//! Chat webhook alert channel

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::{AlertEvent, ChannelKind};
use crate::error::ChannelError;
use crate::supervisor::channels::AlertChannel;

/// Posts alerts as JSON to a chat webhook
#[derive(Clone)]
pub struct WebhookChannel {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: String,
    service: &'a str,
    severity: &'a str,
    timestamp: String,
}

impl WebhookChannel {
    pub fn new(client: Client, webhook_url: String) -> Self {
        info!("Webhook alerts enabled");
        Self {
            client,
            webhook_url,
        }
    }

    fn delivery_error(reason: impl std::fmt::Display) -> ChannelError {
        ChannelError::Delivery {
            channel: ChannelKind::Webhook.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let message = WebhookMessage {
            text: event.format_text(),
            service: &event.service,
            severity: event.severity.as_str(),
            timestamp: event.timestamp.to_rfc3339(),
        };

        match self.client.post(&self.webhook_url).json(&message).send().await {
            Ok(resp) => {
                if resp.status().is_success() {
                    debug!("Webhook alert sent for {}", event.service);
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("Webhook alert failed: {} - {}", status, body);
                    Err(Self::delivery_error(format!("HTTP {}: {}", status, body)))
                }
            }
            Err(e) => {
                error!("Webhook request failed: {}", e);
                Err(Self::delivery_error(e))
            }
        }
    }
}
