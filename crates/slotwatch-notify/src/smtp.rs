//! SMTP delivery through lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::{Notifier, NotifyError};

/// Display name on outgoing mail.
pub const SENDER_NAME: &str = "施設予約Bot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS, usually port 465).
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    StartTls,
}

impl TlsMode {
    pub fn for_port(port: u16) -> Self {
        if port == 587 { TlsMode::StartTls } else { TlsMode::Tls }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub username: String,
    pub password: String,
    /// Sender address; the username when `None`.
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl SmtpConfig {
    /// Split a comma-separated recipient list.
    pub fn recipients(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub struct SmtpNotifier {
    config: SmtpConfig,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_address(address: &str) -> Result<lettre::Address, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl SmtpNotifier {
    /// Validate addresses up front so a bad config fails at startup, not at
    /// the first hit.
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let sender = config.from.as_deref().unwrap_or(&config.username);
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), parse_address(sender)?);
        if config.to.is_empty() {
            return Err(NotifyError::Address {
                address: String::new(),
                reason: "no recipients".into(),
            });
        }
        let to = config
            .to
            .iter()
            .map(|a| parse_address(a).map(|addr| Mailbox::new(None, addr)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { config, from, to })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(body.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, NotifyError> {
        let relay = match self.config.tls {
            TlsMode::Tls => SmtpTransport::relay(&self.config.host),
            TlsMode::StartTls => SmtpTransport::starttls_relay(&self.config.host),
        }
        .map_err(|e| NotifyError::Smtp(format!("relay {} init failed: {e}", self.config.host)))?;
        Ok(relay
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = self.message(subject, body)?;
        let transport = self.transport()?;
        let recipients = self.to.len();
        // lettre's SmtpTransport blocks; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await?
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        info!(host = %self.config.host, recipients, %subject, "mail sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
