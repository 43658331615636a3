//! Click-and-confirm: activate a control and prove the page reacted.
//!
//! The sites we drive have no stable ids or test hooks. A click is therefore
//! only counted once one of three signals is observed:
//!
//! - a full navigation (the document identity changes),
//! - an in-page route change (the URL changes, the document does not),
//! - a change in the set of visible interactive labels (partial update).
//!
//! Unconfirmed clicks are retried with fresh resolution; as a last resort the
//! node is focused and sent Enter.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::page::{Page, TagAllowList};
use crate::resolver::{Candidate, TieBreak, resolve};
use crate::BrowserError;

/// Which signal confirmed an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Navigated,
    RouteChanged,
    LabelsChanged,
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confirmation::Navigated => "navigated",
            Confirmation::RouteChanged => "route changed",
            Confirmation::LabelsChanged => "labels changed",
        })
    }
}

/// Page state captured right before an activation.
#[derive(Debug, Clone)]
struct Baseline {
    document_id: Option<String>,
    url: String,
    labels: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ClickEngine {
    /// How long to wait for a confirmation signal after a click.
    pub confirm_timeout: Duration,
    /// Shorter wait after the keyboard fallback.
    pub key_timeout: Duration,
    /// Resolve-and-click attempts before the keyboard fallback.
    pub attempts: usize,
    pub poll_interval: Duration,
    /// Bounds of the random pause after a confirmed activation.
    pub settle: (Duration, Duration),
    pub allow: TagAllowList,
    /// Tie-break for the first attempt.
    pub tie_break: TieBreak,
    /// Tie-break for retries, so a different duplicate can be tried.
    pub retry_tie_break: TieBreak,
}

impl Default for ClickEngine {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(15),
            key_timeout: Duration::from_secs(5),
            attempts: 3,
            poll_interval: Duration::from_millis(250),
            settle: (Duration::from_millis(200), Duration::from_millis(800)),
            allow: TagAllowList::default(),
            tie_break: TieBreak::First,
            retry_tie_break: TieBreak::Random,
        }
    }
}

impl ClickEngine {
    pub fn with_tie_break(mut self, first: TieBreak, retries: TieBreak) -> Self {
        self.tie_break = first;
        self.retry_tie_break = retries;
        self
    }

    pub fn with_settle(mut self, min: Duration, max: Duration) -> Self {
        self.settle = (min, max.max(min));
        self
    }

    /// Activate the node best matching any of `queries` using the default
    /// allow-list.
    pub async fn activate<P: Page + ?Sized>(
        &self,
        page: &P,
        queries: &[String],
    ) -> Result<Confirmation, BrowserError> {
        self.activate_with(page, queries, &self.allow).await
    }

    /// Like [`activate`](Self::activate) with an explicit allow-list.
    pub async fn activate_with<P: Page + ?Sized>(
        &self,
        page: &P,
        queries: &[String],
        allow: &TagAllowList,
    ) -> Result<Confirmation, BrowserError> {
        let label = queries.join(" | ");
        let attempts = self.attempts.max(1);
        let mut first_baseline: Option<Baseline> = None;
        let mut last_clicked: Option<Candidate> = None;
        let mut resolved_any = false;

        for attempt in 1..=attempts {
            let tie = if attempt == 1 {
                &self.tie_break
            } else {
                &self.retry_tie_break
            };
            if attempt > 1 {
                tokio::time::sleep(self.poll_interval).await;
            }

            // A page between documents costs an attempt, not the activation.
            let before = match self.baseline(page).await {
                Ok(before) => before,
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => {
                    warn!(%label, attempt, error = %e, "page not readable");
                    continue;
                }
            };
            if first_baseline.is_none() {
                first_baseline = Some(before.clone());
            }

            let candidate = match resolve(page, queries, allow, tie).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => {
                    debug!(%label, attempt, "no candidate");
                    continue;
                }
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => {
                    warn!(%label, attempt, error = %e, "page not readable");
                    continue;
                }
            };
            resolved_any = true;

            match page.activate(&candidate.element).await {
                Ok(how) => debug!(
                    %label,
                    attempt,
                    matched = %candidate.matched_text,
                    ?how,
                    "activated"
                ),
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => {
                    warn!(%label, attempt, error = %e, "activation failed");
                    continue;
                }
            }

            if let Some(signal) = self.await_change(page, &before, self.confirm_timeout).await {
                self.confirmed(page, &label, &before, signal).await;
                return Ok(signal);
            }
            warn!(%label, attempt, "no observable change after click");
            last_clicked = Some(candidate);
        }

        if !resolved_any {
            return Err(BrowserError::ElementNotFound {
                queries: queries.to_vec(),
            });
        }

        // The last node that took a click gets the key press, even when a
        // later attempt could no longer find it.
        if let Some(candidate) = last_clicked {
            match self.press_and_confirm(page, &label, &candidate).await {
                Ok(Some(signal)) => return Ok(signal),
                Ok(None) => {}
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => warn!(%label, error = %e, "keyboard fallback failed"),
            }
        }

        let after = self.labels(page).await;
        warn!(%label, "activation unconfirmed");
        debug!(
            before = ?first_baseline.map(|b| b.labels).unwrap_or_default(),
            ?after,
            "label snapshot"
        );
        Err(BrowserError::NoObservableChange { label })
    }

    async fn press_and_confirm<P: Page + ?Sized>(
        &self,
        page: &P,
        label: &str,
        candidate: &Candidate,
    ) -> Result<Option<Confirmation>, BrowserError> {
        let before = self.baseline(page).await?;
        page.press_confirm_key(&candidate.element).await?;
        let Some(signal) = self.await_change(page, &before, self.key_timeout).await else {
            return Ok(None);
        };
        self.confirmed(page, label, &before, signal).await;
        Ok(Some(signal))
    }

    async fn baseline<P: Page + ?Sized>(&self, page: &P) -> Result<Baseline, BrowserError> {
        Ok(Baseline {
            document_id: page.document_id().await?,
            url: page.url().await?,
            labels: page.visible_labels().await?.into_iter().collect(),
        })
    }

    async fn labels<P: Page + ?Sized>(&self, page: &P) -> BTreeSet<String> {
        page.visible_labels()
            .await
            .map(|l| l.into_iter().collect())
            .unwrap_or_default()
    }

    /// Race the three confirmation signals; `None` on timeout.
    async fn await_change<P: Page + ?Sized>(
        &self,
        page: &P,
        before: &Baseline,
        timeout: Duration,
    ) -> Option<Confirmation> {
        let poll = self.poll_interval;

        let navigated = async {
            loop {
                tokio::time::sleep(poll).await;
                if let Ok(Some(id)) = page.document_id().await
                    && before.document_id.as_deref() != Some(id.as_str())
                {
                    return Confirmation::Navigated;
                }
            }
        };
        let rerouted = async {
            loop {
                tokio::time::sleep(poll).await;
                if let Ok(url) = page.url().await
                    && url != before.url
                {
                    return Confirmation::RouteChanged;
                }
            }
        };
        let relabeled = async {
            loop {
                tokio::time::sleep(poll).await;
                if let Ok(labels) = page.visible_labels().await
                    && labels.into_iter().collect::<BTreeSet<_>>() != before.labels
                {
                    return Confirmation::LabelsChanged;
                }
            }
        };

        tokio::time::timeout(timeout, async {
            tokio::select! {
                biased;
                signal = navigated => signal,
                signal = rerouted => signal,
                signal = relabeled => signal,
            }
        })
        .await
        .ok()
    }

    async fn confirmed<P: Page + ?Sized>(
        &self,
        page: &P,
        label: &str,
        before: &Baseline,
        signal: Confirmation,
    ) {
        // A URL change is often the first sign of a full navigation; let the
        // new document finish loading before anyone queries it.
        if signal == Confirmation::RouteChanged {
            let _ = tokio::time::timeout(self.key_timeout, async {
                while !matches!(page.document_id().await, Ok(Some(_))) {
                    tokio::time::sleep(self.poll_interval).await;
                }
            })
            .await;
        }
        let after = self.labels(page).await;
        info!(%label, %signal, "activation confirmed");
        debug!(before = ?before.labels, ?after, "label snapshot");
        self.settle().await;
    }

    async fn settle(&self) {
        let (min, max) = self.settle;
        let pause = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
