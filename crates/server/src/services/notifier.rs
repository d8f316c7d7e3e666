use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, Message, SmtpTransport, Transport,
};

use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound message delivery. Callers decide whether a failure matters.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .context("Failed to create SMTP transport")?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let address = config
            .username
            .as_deref()
            .context("SMTP_USERNAME is required as the sender address")?
            .parse::<Address>()
            .context("SMTP_USERNAME is not a valid sender address")?;

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(Some(config.from_name.clone()), address),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(notification.to.parse::<Mailbox>().context("Invalid recipient address")?)
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN);

        if let Some(reply_to) = &notification.reply_to {
            let reply_to = reply_to
                .parse::<Mailbox>()
                .context("Invalid reply-to address")?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder
            .body(notification.body.clone())
            .context("Failed to build email")?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .context("Mail task panicked")?
            .context("SMTP delivery failed")?;

        Ok(())
    }
}

/// Stand-in used when no SMTP server is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "SMTP not configured, notification logged only"
        );
        Ok(())
    }
}
