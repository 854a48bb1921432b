//! Email alert channel over an SMTP relay

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use crate::config::AlertingConfig;
use crate::domain::{AlertEvent, ChannelKind};
use crate::error::{ChannelError, Result, WardenError};
use crate::supervisor::channels::AlertChannel;

/// Sends each alert as a plain-text mail to one recipient
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    /// Build from alerting config; `None` when no recipient is configured
    pub fn from_config(config: &AlertingConfig) -> Result<Option<Self>> {
        let Some(ref to) = config.email_to else {
            return Ok(None);
        };

        let to: Mailbox = to
            .parse()
            .map_err(|e| WardenError::ConfigInvalid(format!("invalid email_to '{}': {}", to, e)))?;
        let from: Mailbox = config.email_from.parse().map_err(|e| {
            WardenError::ConfigInvalid(format!("invalid email_from '{}': {}", config.email_from, e))
        })?;

        let builder = if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(|e| {
                WardenError::ConfigInvalid(format!("invalid SMTP relay '{}': {}", config.smtp_host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.channel_timeout()));

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(
            "Email alerts enabled via {}:{} to {}",
            config.smtp_host, config.smtp_port, to
        );

        Ok(Some(Self {
            transport: builder.build(),
            from,
            to,
        }))
    }

    fn delivery_error(reason: impl std::fmt::Display) -> ChannelError {
        ChannelError::Delivery {
            channel: ChannelKind::Email.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, event: &AlertEvent) -> std::result::Result<(), ChannelError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(event.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(event.format_text())
            .map_err(Self::delivery_error)?;

        match self.transport.send(message).await {
            Ok(_) => {
                debug!("Alert mail sent for {}", event.service);
                Ok(())
            }
            Err(e) => {
                error!("Alert mail for {} failed: {}", event.service, e);
                Err(Self::delivery_error(e))
            }
        }
    }
}
