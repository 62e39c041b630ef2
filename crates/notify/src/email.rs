//! SMTP delivery via `lettre` with TLS support.
//!
//! Every recipient of a delivery becomes a `To:` mailbox on one message.

use herald_core::config::SmtpConfig;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::traits::{Delivery, DeliveryProvider, NotifyError};

const DEFAULT_SMTP_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends deliveries as emails via SMTP.
#[derive(Debug)]
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpProvider {
    /// Build a provider from SMTP configuration.
    ///
    /// Port defaults to 587. Port 465 always uses implicit TLS; any other
    /// port uses STARTTLS unless `tls` is explicitly `false`. Credentials
    /// are attached only when both username and password are configured.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let port = config.port.unwrap_or(DEFAULT_SMTP_PORT);
        let use_tls = config.tls.unwrap_or(true);

        let mut builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::debug!(host = %config.host, port, tls = use_tls, "SMTP provider configured");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Assemble the message without sending it.
    pub fn build_message(&self, delivery: &Delivery) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &delivery.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .subject(delivery.subject.as_deref().unwrap_or(&delivery.event_type))
            .body(delivery.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{addr}: {e}")))
}

#[async_trait::async_trait]
impl DeliveryProvider for SmtpProvider {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), NotifyError> {
        let email = self.build_message(delivery)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::debug!(
            event_type = %delivery.event_type,
            recipients = delivery.recipients.len(),
            "email handed to SMTP relay"
        );
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "smtp"
    }
}
