//! SMTP email delivery
//!
//! Async SMTP over implicit TLS (port 465 style relays). Sends run in
//! background tasks; failures are logged by the caller, never surfaced to
//! the HTTP client that queued the notification.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::Args;
use crate::types::{Result, TallyError};

/// SMTP mailer bound to a single relay and from-address
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// Build a mailer from configuration. Returns `None` when SMTP_HOST is
    /// unset (email disabled).
    pub fn from_args(args: &Args) -> Result<Option<Self>> {
        let host = match &args.smtp_host {
            Some(host) => host,
            None => return Ok(None),
        };
        let from = args
            .smtp_from
            .as_deref()
            .ok_or_else(|| TallyError::Config("SMTP_FROM is required".into()))?
            .parse::<Mailbox>()
            .map_err(|e| TallyError::Config(format!("Invalid SMTP_FROM address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| TallyError::Config(format!("Invalid SMTP relay: {}", e)))?
            .port(args.smtp_port);

        if let (Some(user), Some(pass)) = (&args.smtp_username, &args.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    /// Send a plain-text message
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| TallyError::Email(format!("Invalid recipient address: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| TallyError::Email(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| TallyError::Email(format!("SMTP send failed: {}", e)))?;

        info!(subject, "Email sent");
        Ok(())
    }
}
