//! Production [`Scanner`]: drive a browser page through a target's site.

use std::time::Duration;

use async_trait::async_trait;
use slotwatch_browser::{BrowserError, ClickEngine, Page, Paginator, strategy_for};
use slotwatch_core::Target;
use tracing::info;

use crate::run::{Capture, Scanner};

pub struct BrowserScanner<P> {
    page: P,
    engine: ClickEngine,
    paginator: Paginator,
    navigation_timeout: Duration,
}

impl<P: Page + 'static> BrowserScanner<P> {
    pub fn new(page: P) -> Self {
        Self {
            page,
            engine: ClickEngine::default(),
            paginator: Paginator::default(),
            navigation_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_engine(mut self, engine: ClickEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

#[async_trait]
impl<P: Page + 'static> Scanner for BrowserScanner<P> {
    async fn scan(&self, target: &Target) -> Result<Capture, BrowserError> {
        info!(name = %target.name, url = %target.url, kind = %target.kind, "scanning");
        self.page.goto(&target.url, self.navigation_timeout).await?;

        strategy_for(target.kind)
            .walk_path(&self.page, &self.engine, &target.facility_path)
            .await?;

        let max_pages = target.max_pages.unwrap_or(self.paginator.max_pages);
        let text = self
            .paginator
            .collect_pages(&self.page, &self.engine, &target.result_selector, max_pages)
            .await?;
        let url = self.page.url().await?;
        Ok(Capture { text, url })
    }
}
