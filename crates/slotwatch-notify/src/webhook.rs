//! JSON webhook delivery (Slack/Discord-style incoming hooks).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::{Notifier, NotifyError};

#[derive(Debug, Serialize)]
struct Payload<'a> {
    subject: &'a str,
    body: &'a str,
    /// Subject and body together, for hooks that only read `text`.
    text: String,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = Payload {
            subject,
            body,
            text: format!("{subject}\n\n{body}"),
        };
        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Server {
                status: status.as_u16(),
                body,
            });
        }
        info!(url = %self.url, %subject, "webhook delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
