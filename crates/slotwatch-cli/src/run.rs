//! One pass over all targets: capture, detect, dedup, report.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use rand::Rng;
use slotwatch_browser::BrowserError;
use slotwatch_core::{Detector, NotifiedKey, ScanResult, Target};
use slotwatch_notify::Notifier;
use slotwatch_store::{SeenStore, StoreError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::report;

/// What a scanner brought back from one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Aggregated result-region text of every page read.
    pub text: String,
    /// Where the browser ended up.
    pub url: String,
}

#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, target: &Target) -> Result<Capture, BrowserError>;
}

/// Random delay between consecutive targets.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(2000),
            max: Duration::from_millis(4000),
        }
    }
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    fn delay(&self) -> Duration {
        if self.max > self.min {
            rand::rng().random_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub result: ScanResult,
    /// Slots seen for the first time in this run, already recorded in the store.
    pub new_keys: Vec<NotifiedKey>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started: DateTime<Tz>,
    pub outcomes: Vec<TargetOutcome>,
}

impl RunReport {
    pub fn hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.hit).count()
    }

    pub fn errors(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_error()).count()
    }

    pub fn new_keys(&self) -> impl Iterator<Item = &NotifiedKey> {
        self.outcomes.iter().flat_map(|o| o.new_keys.iter())
    }
}

/// Check every target in order.
///
/// A failing target becomes an error [`ScanResult`] and the run moves on. A
/// store failure aborts the run: continuing would notify slots that can no
/// longer be recorded.
pub async fn run_targets<S, St>(
    targets: &[Target],
    scanner: &S,
    store: &mut St,
    pacing: &Pacing,
    today: NaiveDate,
) -> Result<Vec<TargetOutcome>, StoreError>
where
    S: Scanner + ?Sized,
    St: SeenStore + ?Sized,
{
    let mut outcomes = Vec::with_capacity(targets.len());

    for (i, target) in targets.iter().enumerate() {
        let started = Instant::now();
        let outcome = match scanner.scan(target).await {
            Ok(capture) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                evaluate(target, &capture, store, today, elapsed_ms)?
            }
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(name = %target.name, error = %e, "target failed");
                TargetOutcome {
                    result: ScanResult::failed(&target.name, &target.url, &e, elapsed_ms),
                    new_keys: Vec::new(),
                }
            }
        };
        info!(
            name = %target.name,
            hit = outcome.result.hit,
            new = outcome.new_keys.len(),
            elapsed_ms = outcome.result.elapsed_ms,
            "target checked"
        );
        outcomes.push(outcome);

        if i + 1 < targets.len() {
            let pause = pacing.delay();
            debug!(pause_ms = pause.as_millis() as u64, "pacing");
            tokio::time::sleep(pause).await;
        }
    }

    Ok(outcomes)
}

fn evaluate<St: SeenStore + ?Sized>(
    target: &Target,
    capture: &Capture,
    store: &mut St,
    today: NaiveDate,
    elapsed_ms: u64,
) -> Result<TargetOutcome, StoreError> {
    let detector = match Detector::new(&target.keywords(), &target.weekdays()) {
        Ok(d) => d,
        Err(e) => {
            return Ok(TargetOutcome {
                result: ScanResult::failed(
                    &target.name,
                    &target.url,
                    format!("bad keyword pattern: {e}"),
                    elapsed_ms,
                ),
                new_keys: Vec::new(),
            });
        }
    };

    debug!(name = %target.name, landed = %capture.url, "captured");
    let slots = detector.open_slots(&capture.text, today);
    let mut new_keys = Vec::new();
    for slot in &slots {
        let key = NotifiedKey::for_slot(target, slot);
        if !key.accepted_by(target) {
            debug!(%key, "filtered out");
            continue;
        }
        let rendered = key.to_string();
        if store.has(&rendered) {
            debug!(%key, "already notified");
            continue;
        }
        if store.add(&rendered)? {
            info!(%key, "new open slot");
            new_keys.push(key);
        }
    }

    Ok(TargetOutcome {
        result: ScanResult::completed(
            &target.name,
            &target.url,
            !slots.is_empty(),
            &capture.text,
            elapsed_ms,
        ),
        new_keys,
    })
}

/// Log the report, and send it when the run found slots nobody was told about.
///
/// Returns whether a notification went out. A transport failure is logged,
/// never propagated.
pub async fn deliver(report: &RunReport, notifier: &dyn Notifier) -> bool {
    let body = report::render(report);
    let fresh = report.new_keys().count();
    if fresh == 0 {
        info!(hits = report.hits(), errors = report.errors(), "no new slots\n{body}");
        return false;
    }
    match notifier.send(&report::subject(fresh), &body).await {
        Ok(()) => {
            info!(new = fresh, transport = notifier.name(), "report sent");
            true
        }
        Err(e) => {
            warn!(error = %e, "report delivery failed\n{body}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use slotwatch_browser::memory::{Effect, MemoryDocument, MemoryElement, MemoryPage};
    use slotwatch_browser::{ClickEngine, Page, Paginator};
    use slotwatch_core::{SiteKind, StepQuery};
    use slotwatch_notify::NotifyError;
    use slotwatch_store::MemoryStore;

    use super::*;
    use crate::scanner::BrowserScanner;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn target(name: &str, url: &str) -> Target {
        Target {
            name: name.into(),
            url: url.into(),
            result_selector: "#calendar".into(),
            keywords: vec![],
            kind: SiteKind::Generic,
            facility_path: vec![],
            location: None,
            facility: None,
            weekdays: vec![],
            times: vec![],
            courts: vec![],
            max_pages: None,
        }
    }

    /// Scanner answering from a table keyed by target name.
    struct Scripted(HashMap<String, Result<String, String>>);

    #[async_trait]
    impl Scanner for Scripted {
        async fn scan(&self, target: &Target) -> Result<Capture, BrowserError> {
            match self.0.get(&target.name) {
                Some(Ok(text)) => Ok(Capture {
                    text: text.clone(),
                    url: target.url.clone(),
                }),
                Some(Err(e)) => Err(BrowserError::Script(e.clone())),
                None => Err(BrowserError::ElementNotFound { queries: vec![] }),
            }
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                Err(NotifyError::Smtp("535 authentication failed".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "outbox"
        }
    }

    fn report(outcomes: Vec<TargetOutcome>) -> RunReport {
        RunReport {
            started: chrono_tz::Asia::Tokyo
                .with_ymd_and_hms(2025, 1, 1, 9, 0, 0)
                .unwrap(),
            outcomes,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_target_does_not_stop_the_run() {
        let targets = vec![
            target("A", "https://a.example.jp"),
            target("B", "https://b.example.jp"),
            target("C", "https://c.example.jp"),
        ];
        let scanner = Scripted(HashMap::from([
            ("A".to_string(), Ok("01/05(日) 空き".to_string())),
            ("B".to_string(), Err("navigation timeout".to_string())),
            ("C".to_string(), Ok("01/12 満".to_string())),
        ]));
        let mut store = MemoryStore::new();

        let outcomes = run_targets(
            &targets,
            &scanner,
            &mut store,
            &Pacing::default(),
            ymd(2025, 1, 1),
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.hit);
        assert_eq!(outcomes[0].new_keys.len(), 1);
        assert!(outcomes[1].result.is_error());
        assert!(outcomes[1].result.error.as_deref().unwrap().contains("navigation timeout"));
        assert!(!outcomes[2].result.hit);
        assert!(!outcomes[2].result.is_error());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_between_targets_only() {
        let targets = vec![
            target("A", "https://a.example.jp"),
            target("B", "https://b.example.jp"),
            target("C", "https://c.example.jp"),
        ];
        let scanner = Scripted(HashMap::new());
        let pacing = Pacing::new(Duration::from_secs(2), Duration::from_secs(2));

        let started = Instant::now();
        run_targets(&targets, &scanner, &mut MemoryStore::new(), &pacing, ymd(2025, 1, 1))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn known_keys_are_not_new() {
        let targets = vec![target("A", "https://a.example.jp")];
        let scanner = Scripted(HashMap::from([(
            "A".to_string(),
            Ok("01/05(日) 空き 01/12(日) 空き".to_string()),
        )]));
        let mut store = MemoryStore::with_keys(["A|A|2025-01-05||"]);

        let outcomes = run_targets(
            &targets,
            &scanner,
            &mut store,
            &Pacing::default(),
            ymd(2025, 1, 1),
        )
        .await
        .unwrap();
        let fresh: Vec<String> = outcomes[0].new_keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(fresh, vec!["A|A|2025-01-12||"]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn filters_drop_slots_but_not_the_hit() {
        let mut t = target("A", "https://a.example.jp");
        t.times = vec!["13:00-15:00".into()];
        let scanner = Scripted(HashMap::from([(
            "A".to_string(),
            Ok("01/05(日) 09:00～11:00 空き".to_string()),
        )]));
        let mut store = MemoryStore::new();

        let outcomes =
            run_targets(&[t], &scanner, &mut store, &Pacing::default(), ymd(2025, 1, 1))
                .await
                .unwrap();
        assert!(outcomes[0].result.hit);
        assert!(outcomes[0].new_keys.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn nothing_new_sends_nothing() {
        let outbox = Outbox::default();
        let report = report(vec![TargetOutcome {
            result: ScanResult::completed("A", "https://a.example.jp", true, "01/05 空き", 10),
            new_keys: vec![],
        }]);
        assert!(!deliver(&report, &outbox).await);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let outbox = Outbox {
            fail: true,
            ..Default::default()
        };
        let report = report(vec![TargetOutcome {
            result: ScanResult::completed("A", "https://a.example.jp", true, "01/05 空き", 10),
            new_keys: vec![NotifiedKey::new("A", "A", ymd(2025, 1, 5), "", "")],
        }]);
        assert!(!deliver(&report, &outbox).await);
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    // ── Browser-backed scenario ──

    const PORTAL: &str = "https://yoyaku.example.jp/ebina/";
    const FACILITY: &str = "https://yoyaku.example.jp/ebina/facility";
    const JANUARY: &str = "https://yoyaku.example.jp/ebina/cal?m=1";
    const FEBRUARY: &str = "https://yoyaku.example.jp/ebina/cal?m=2";

    async fn portal() -> MemoryPage {
        let page = MemoryPage::new()
            .document(
                PORTAL,
                MemoryDocument::new()
                    .with(MemoryElement::link("検索"))
                    .with(
                        MemoryElement::link("施設の空き状況")
                            .on_click(Effect::Navigate(FACILITY.into())),
                    ),
            )
            .document(
                FACILITY,
                MemoryDocument::new()
                    .with(MemoryElement::span("庭球場のご案内"))
                    .in_frame(
                        1,
                        MemoryElement::submit("庭球場").on_click(Effect::Navigate(JANUARY.into())),
                    ),
            )
            .document(
                JANUARY,
                MemoryDocument::new()
                    // Long enough that February's dates sit outside the "空き" window.
                    .region(
                        "#calendar",
                        &format!(
                            "12/29(日) × 01/05(日) 09:00～11:00 コートＡ 空き{}",
                            "・".repeat(150)
                        ),
                    )
                    .with(MemoryElement::link("翌月").on_click(Effect::Navigate(FEBRUARY.into()))),
            )
            .document(
                FEBRUARY,
                MemoryDocument::new().region("#calendar", "02/02(日) 09:00～11:00 コートＡ 満"),
            );
        page.goto("about:blank", Duration::from_secs(1)).await.unwrap();
        page
    }

    fn ebina() -> Target {
        Target {
            kind: SiteKind::Ekanagawa,
            facility_path: vec![
                StepQuery::One("施設の空き状況".into()),
                StepQuery::AnyOf(vec!["テニス".into(), "庭球場".into()]),
            ],
            location: Some("海老名市".into()),
            facility: Some("海老名運動公園".into()),
            ..target("海老名運動公園 テニスコート", PORTAL)
        }
    }

    fn scanner(page: MemoryPage) -> BrowserScanner<MemoryPage> {
        BrowserScanner::new(page)
            .with_engine(ClickEngine::default().with_settle(Duration::ZERO, Duration::ZERO))
            .with_paginator(Paginator::default())
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_notifies_once() {
        let scanner = scanner(portal().await);
        let targets = vec![ebina()];
        let mut store = MemoryStore::new();
        let outbox = Outbox::default();
        let today = ymd(2025, 1, 1);

        let outcomes = run_targets(&targets, &scanner, &mut store, &Pacing::default(), today)
            .await
            .unwrap();
        let first = report(outcomes);
        assert_eq!(first.hits(), 1);
        let keys: Vec<String> = first.new_keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec!["海老名市|海老名運動公園|2025-01-05|09:00-11:00|コートA"]
        );
        assert!(first.outcomes[0].result.sample.contains("02/02(日)"));
        // Reported under the configured entry point, not the last page read.
        assert_eq!(first.outcomes[0].result.url, PORTAL);
        assert!(deliver(&first, &outbox).await);

        let outcomes = run_targets(&targets, &scanner, &mut store, &Pacing::default(), today)
            .await
            .unwrap();
        let second = report(outcomes);
        assert_eq!(second.hits(), 1);
        assert_eq!(second.new_keys().count(), 0);
        assert!(!deliver(&second, &outbox).await);

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "【空き検知】1件");
        assert!(sent[0].1.contains("海老名市|海老名運動公園|2025-01-05|09:00-11:00|コートA"));
    }

    #[tokio::test(start_paused = true)]
    async fn hit_error_and_miss_in_one_run() {
        const DOWN: &str = "https://down.example.jp/";
        const CHIGASAKI: &str = "https://chigasaki.example.jp/cal";
        let page = portal()
            .await
            .unreachable(DOWN)
            .document(
                CHIGASAKI,
                MemoryDocument::new().region("#calendar", "01/12(日) 満 01/19(日) 満"),
            );
        let scanner = scanner(page);
        let targets = vec![
            ebina(),
            target("停止中施設", DOWN),
            Target {
                kind: SiteKind::Chigasaki,
                ..target("茅ヶ崎公園", CHIGASAKI)
            },
        ];
        let mut store = MemoryStore::new();
        let outbox = Outbox::default();

        let outcomes = run_targets(
            &targets,
            &scanner,
            &mut store,
            &Pacing::default(),
            ymd(2025, 1, 1),
        )
        .await
        .unwrap();
        let run = report(outcomes);
        assert_eq!(run.hits(), 1);
        assert_eq!(run.errors(), 1);
        assert!(deliver(&run, &outbox).await);

        assert_eq!(store.len(), 1);
        assert!(store.has("海老名市|海老名運動公園|2025-01-05|09:00-11:00|コートA"));

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (subject, body) = &sent[0];
        assert_eq!(subject, "【空き検知】1件");
        assert!(body.contains(&format!("✅ 海老名運動公園 テニスコート（{PORTAL}）")), "{body}");
        assert!(body.contains(&format!("× 停止中施設（{DOWN}）: ERROR")), "{body}");
        assert!(body.contains("ERR_NAME_NOT_RESOLVED"), "{body}");
        assert!(body.contains(&format!("— 茅ヶ崎公園（{CHIGASAKI}）")), "{body}");
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_portal_is_a_failed_target() {
        let page = MemoryPage::new().unreachable(PORTAL);
        let scanner = scanner(page);
        let outcomes = run_targets(
            &[ebina()],
            &scanner,
            &mut MemoryStore::new(),
            &Pacing::default(),
            ymd(2025, 1, 1),
        )
        .await
        .unwrap();
        let error = outcomes[0].result.error.as_deref().unwrap();
        assert!(error.contains("ERR_NAME_NOT_RESOLVED"), "{error}");
    }

    #[tokio::test(start_paused = true)]
    async fn shared_scanner_is_reusable_across_targets() {
        let page = portal().await;
        let scanner = Arc::new(scanner(page));
        let targets = vec![ebina(), ebina()];
        let outcomes = run_targets(
            &targets,
            scanner.as_ref(),
            &mut MemoryStore::new(),
            &Pacing::default(),
            ymd(2025, 1, 1),
        )
        .await
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].new_keys.len(), 1);
        assert!(outcomes[1].new_keys.is_empty());
        assert!(outcomes[1].result.hit);
    }
}
