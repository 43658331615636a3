//! Delivery of run reports: log, SMTP mail and JSON webhook.
//!
//! Every transport implements [`Notifier`]. Transports that need a network
//! stack sit behind features (`smtp`, `http`) so the core of slotwatch can be
//! built and tested without them.

mod error;

#[cfg(feature = "smtp")]
pub mod smtp;
#[cfg(feature = "http")]
pub mod webhook;

use async_trait::async_trait;
use tracing::{info, warn};

pub use error::NotifyError;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpNotifier, TlsMode};
#[cfg(feature = "http")]
pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Implementations must not retry on their own.
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Writes reports to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(%subject, "notification\n{body}");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sends through every configured transport.
///
/// All transports are attempted even when an earlier one fails; the result is
/// an error if any of them failed.
#[derive(Default)]
pub struct FanOut {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanOut {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            match notifier.send(subject, body).await {
                Ok(()) => info!(transport = notifier.name(), "notification sent"),
                Err(e) => {
                    warn!(transport = notifier.name(), error = %e, "notification failed");
                    errors.push(e);
                }
            }
        }
        let failed = errors.len();
        match errors.into_iter().next() {
            None => Ok(()),
            Some(first) if failed == 1 && self.notifiers.len() == 1 => Err(first),
            Some(first) => Err(NotifyError::Partial {
                failed,
                total: self.notifiers.len(),
                first: Box::new(first),
            }),
        }
    }

    fn name(&self) -> &str {
        "fan-out"
    }
}
