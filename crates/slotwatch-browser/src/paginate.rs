//! Pagination: read the result region, then follow "next period" controls.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::ClickEngine;
use crate::page::Page;
use crate::BrowserError;

/// Labels of "next month / next week" controls, most specific first.
pub const NEXT_PERIOD_LABELS: &[&str] = &[
    "翌月", "次の月", "次月", "次へ", "翌週", "次週", "次", "Next", "＞", ">",
];

#[derive(Debug, Clone)]
pub struct Paginator {
    /// Pages to read including the first.
    pub max_pages: usize,
    pub next_labels: Vec<String>,
    /// How long to wait for the result region to appear.
    pub region_timeout: Duration,
    /// Body text length below which the page is assumed half-rendered.
    pub min_body_len: usize,
    /// Upper bound on waiting for `min_body_len`; the page is read anyway after.
    pub body_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            max_pages: 2,
            next_labels: NEXT_PERIOD_LABELS.iter().map(|s| s.to_string()).collect(),
            region_timeout: Duration::from_secs(25),
            min_body_len: 200,
            body_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Paginator {
    pub async fn collect<P: Page + ?Sized>(
        &self,
        page: &P,
        engine: &ClickEngine,
        selector: &str,
    ) -> Result<String, BrowserError> {
        self.collect_pages(page, engine, selector, self.max_pages).await
    }

    /// Text of up to `max_pages` consecutive result pages, newline-separated.
    ///
    /// Only the first page is mandatory: a missing region there is
    /// [`BrowserError::SelectorTimeout`]. Past the first page any failure ends
    /// aggregation and the text gathered so far is returned.
    pub async fn collect_pages<P: Page + ?Sized>(
        &self,
        page: &P,
        engine: &ClickEngine,
        selector: &str,
        max_pages: usize,
    ) -> Result<String, BrowserError> {
        let mut pages = vec![self.read_region(page, selector).await?];

        for number in 2..=max_pages {
            if !self.advance(page, engine).await? {
                info!(page = number, "no next-period control; stopping");
                break;
            }
            match self.read_region(page, selector).await {
                Ok(text) => pages.push(text),
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => {
                    warn!(page = number, error = %e, "next page unreadable; partial result kept");
                    break;
                }
            }
        }

        debug!(pages = pages.len(), "collected result pages");
        Ok(pages.join("\n"))
    }

    /// Try each next-period label in order; `false` when none could be activated.
    async fn advance<P: Page + ?Sized>(
        &self,
        page: &P,
        engine: &ClickEngine,
    ) -> Result<bool, BrowserError> {
        for label in &self.next_labels {
            match engine.activate(page, std::slice::from_ref(label)).await {
                Ok(signal) => {
                    debug!(%label, %signal, "advanced to next period");
                    return Ok(true);
                }
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => debug!(%label, error = %e, "next-period label unusable"),
            }
        }
        Ok(false)
    }

    async fn read_region<P: Page + ?Sized>(
        &self,
        page: &P,
        selector: &str,
    ) -> Result<String, BrowserError> {
        let present = tokio::time::timeout(self.region_timeout, async {
            loop {
                match page.region_text(selector).await {
                    Ok(Some(text)) => return Ok(text),
                    Ok(None) => {}
                    Err(e) if e.is_fatal_to_page() => return Err(e),
                    Err(e) => debug!(selector, error = %e, "region query failed"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
        .await
        .map_err(|_| BrowserError::SelectorTimeout {
            selector: selector.to_string(),
            timeout: self.region_timeout,
        })??;

        let filled = tokio::time::timeout(self.body_timeout, async {
            loop {
                if let Ok(len) = page.body_text_len().await
                    && len >= self.min_body_len
                {
                    return;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
        .await;
        if filled.is_err() {
            debug!(selector, min = self.min_body_len, "body stayed short; reading anyway");
            return Ok(present);
        }

        // Re-read: the region may have filled in while the body grew.
        Ok(page.region_text(selector).await?.unwrap_or(present))
    }
}
