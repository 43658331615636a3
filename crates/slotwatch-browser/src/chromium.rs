//! [`Page`] over a real Chrome instance via the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::page::{Activation, ContextId, ElementInfo, ElementRef, Page, TagAllowList};
use crate::BrowserError;

mod scripts;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Chrome binary; `None` lets chromiumoxide search the usual locations.
    pub executable: Option<PathBuf>,
    /// IANA zone the page clock runs in.
    pub timezone: String,
    pub accept_language: String,
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            timezone: "Asia/Tokyo".into(),
            accept_language: "ja-JP,ja;q=0.9".into(),
            extra_args: Vec::new(),
        }
    }
}

/// A launched browser and its CDP event loop.
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    options: LaunchOptions,
}

impl ChromiumBrowser {
    pub async fn launch(options: LaunchOptions) -> Result<Self, BrowserError> {
        let mut args = vec![
            "--lang=ja-JP".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
        ];
        args.extend(options.extra_args.iter().cloned());

        let mut builder = BrowserConfig::builder();
        if let Some(ref bin) = options.executable {
            builder = builder.chrome_executable(bin);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.args(args).build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(error = %e, "cdp handler event error");
                }
            }
            debug!("cdp handler finished");
        });

        info!(headless = options.headless, timezone = %options.timezone, "browser launched");
        Ok(Self {
            browser,
            handler,
            options,
        })
    }

    /// Open a blank tab with locale headers and time zone applied.
    pub async fn new_page(&self) -> Result<ChromiumPage, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(classify)?;

        let headers = Headers::new(serde_json::json!({
            "Accept-Language": self.options.accept_language,
        }));
        page.execute(SetExtraHttpHeadersParams::new(headers))
            .await
            .map_err(classify)?;
        page.execute(SetTimezoneOverrideParams::new(self.options.timezone.clone()))
            .await
            .map_err(classify)?;

        Ok(ChromiumPage { page })
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
        self.handler.abort();
    }
}

/// Map a CDP failure, treating a dead transport as [`BrowserError::Disconnected`].
fn classify(e: impl std::fmt::Display) -> BrowserError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if ["receiver is gone", "channel closed", "connection reset", "broken pipe"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        BrowserError::Disconnected(msg)
    } else {
        BrowserError::Script(msg)
    }
}

pub struct ChromiumPage {
    page: chromiumoxide::Page,
}

#[derive(Deserialize)]
struct Reply<T> {
    ok: bool,
    value: Option<T>,
    error: Option<String>,
}

impl ChromiumPage {
    /// Run a script that answers `{ ok, value?, error? }`.
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<Option<T>, BrowserError> {
        let reply: Reply<T> = self
            .page
            .evaluate(script)
            .await
            .map_err(classify)?
            .into_value()
            .map_err(|e| BrowserError::Script(format!("unexpected script result: {e}")))?;
        if !reply.ok {
            return Err(BrowserError::Script(
                reply.error.unwrap_or_else(|| "script reported failure".into()),
            ));
        }
        Ok(reply.value)
    }

    async fn eval_required<T: DeserializeOwned>(&self, script: String) -> Result<T, BrowserError> {
        self.eval(script)
            .await?
            .ok_or_else(|| BrowserError::Script("script returned no value".into()))
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, navigation).await {
            Err(_) => Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(e)) => match classify(e) {
                BrowserError::Script(details) => Err(BrowserError::Navigate {
                    url: url.to_string(),
                    details,
                }),
                other => Err(other),
            },
            Ok(Ok(())) => {
                debug!(url, "navigation finished");
                Ok(())
            }
        }
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.page.url().await.map_err(classify)?.unwrap_or_default())
    }

    async fn document_id(&self) -> Result<Option<String>, BrowserError> {
        self.eval(scripts::document_id()).await
    }

    async fn contexts(&self) -> Result<Vec<ContextId>, BrowserError> {
        let count: usize = self.eval_required(scripts::context_count()).await?;
        Ok((0..count).collect())
    }

    async fn elements(
        &self,
        context: ContextId,
        allow: &TagAllowList,
    ) -> Result<Vec<ElementInfo>, BrowserError> {
        Ok(self
            .eval(scripts::elements(context, allow))
            .await?
            .unwrap_or_default())
    }

    async fn activate(&self, element: &ElementRef) -> Result<Activation, BrowserError> {
        let mode: String = self.eval_required(scripts::activate(element)).await?;
        Ok(if mode == "synthetic" {
            Activation::Synthetic
        } else {
            Activation::Native
        })
    }

    async fn press_confirm_key(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let _: bool = self.eval_required(scripts::focus(element)).await?;
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .text("\r")
            .build()
            .map_err(BrowserError::Script)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .map_err(BrowserError::Script)?;
        self.page.execute(down).await.map_err(classify)?;
        self.page.execute(up).await.map_err(classify)?;
        Ok(())
    }

    async fn fill_text(&self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        let _: bool = self.eval_required(scripts::fill_text(element, text)).await?;
        Ok(())
    }

    async fn visible_labels(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self
            .eval(scripts::visible_labels())
            .await?
            .unwrap_or_default())
    }

    async fn region_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.eval(scripts::region_text(selector)).await
    }

    async fn body_text_len(&self) -> Result<usize, BrowserError> {
        self.eval_required(scripts::body_text_len()).await
    }
}
