//! Per-site navigation from a portal's landing page to the facility calendar.

use async_trait::async_trait;
use slotwatch_core::{SiteKind, StepQuery};
use tracing::{debug, info};

use crate::engine::ClickEngine;
use crate::page::{ElementRef, Page, TagAllowList};
use crate::BrowserError;

/// Labels of the button that submits a facility search form.
pub const SEARCH_LABELS: &[&str] = &["検索", "さがす"];

#[async_trait]
pub trait SiteStrategy: Send + Sync {
    fn kind(&self) -> SiteKind;

    /// Allow-lists tried in order for every step label.
    fn step_allow_lists(&self, engine: &ClickEngine) -> Vec<TagAllowList> {
        vec![engine.allow.clone()]
    }

    fn walks_path(&self) -> bool {
        true
    }

    /// Whether the final step is preceded by typing its label into the
    /// page's search box, when the page has one.
    fn searches_last_step(&self) -> bool {
        false
    }

    /// Whether a label that is not found is retried word by word.
    fn splits_labels(&self) -> bool {
        false
    }

    /// Click through `path` one step at a time.
    ///
    /// Within a step the alternatives are tried in order and the first one
    /// that activates with a confirmed change wins. A step none of whose
    /// alternatives works fails the walk.
    async fn walk_path(
        &self,
        page: &dyn Page,
        engine: &ClickEngine,
        path: &[StepQuery],
    ) -> Result<(), BrowserError> {
        if !self.walks_path() {
            if !path.is_empty() {
                debug!(
                    kind = %self.kind(),
                    steps = path.len(),
                    "site reads results directly; path ignored"
                );
            }
            return Ok(());
        }

        let allow_lists = self.step_allow_lists(engine);
        for (number, step) in path.iter().enumerate() {
            let alternatives: Vec<String> = step
                .alternatives()
                .into_iter()
                .filter(|a| !a.trim().is_empty())
                .collect();

            if self.searches_last_step()
                && number + 1 == path.len()
                && let Some(name) = alternatives.first()
            {
                search_for(page, engine, name).await?;
            }

            let mut result = activate_step(page, engine, number, &alternatives, &allow_lists).await;
            if self.splits_labels() && matches!(result, Err(BrowserError::ElementNotFound { .. })) {
                let words = split_words(&alternatives);
                if !words.is_empty() {
                    debug!(step = number, ?words, "retrying step word by word");
                    result = activate_step(page, engine, number, &words, &allow_lists).await;
                }
            }
            result?;
        }
        Ok(())
    }
}

/// Try `alternatives` against each allow-list until one activation is
/// confirmed.
async fn activate_step(
    page: &dyn Page,
    engine: &ClickEngine,
    number: usize,
    alternatives: &[String],
    allow_lists: &[TagAllowList],
) -> Result<(), BrowserError> {
    let mut failure: Option<BrowserError> = None;
    for alternative in alternatives {
        let query = [alternative.clone()];
        for allow in allow_lists {
            match engine.activate_with(page, &query, allow).await {
                Ok(signal) => {
                    info!(step = number, label = %alternative, %signal, "step confirmed");
                    return Ok(());
                }
                Err(e) if e.is_fatal_to_page() => return Err(e),
                Err(e) => {
                    debug!(step = number, label = %alternative, error = %e, "step attempt failed");
                    failure = Some(prefer_informative(failure, e));
                }
            }
        }
    }
    Err(failure.unwrap_or_else(|| BrowserError::ElementNotFound {
        queries: alternatives.to_vec(),
    }))
}

/// Whitespace-separated words of multi-word labels, deduplicated, in order.
fn split_words(alternatives: &[String]) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for alternative in alternatives {
        let parts: Vec<&str> = alternative.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        for part in parts {
            if !words.iter().any(|w| w == part) {
                words.push(part.to_string());
            }
        }
    }
    words
}

/// Type `text` into the first visible text field and submit it.
///
/// Returns whether a search was submitted. A page without a text field, or
/// whose search does not visibly react, is left as it is.
pub async fn search_for(
    page: &dyn Page,
    engine: &ClickEngine,
    text: &str,
) -> Result<bool, BrowserError> {
    let Some(field) = first_text_field(page).await? else {
        return Ok(false);
    };
    if let Err(e) = page.fill_text(&field, text).await {
        if e.is_fatal_to_page() {
            return Err(e);
        }
        debug!(error = %e, "search box not writable");
        return Ok(false);
    }

    let labels: Vec<String> = SEARCH_LABELS.iter().map(|l| l.to_string()).collect();
    match engine.activate_with(page, &labels, &TagAllowList::buttons()).await {
        Ok(signal) => {
            info!(%text, %signal, "search submitted");
            Ok(true)
        }
        Err(e) if e.is_fatal_to_page() => Err(e),
        Err(e) => {
            debug!(%text, error = %e, "search not submitted");
            Ok(false)
        }
    }
}

async fn first_text_field(page: &dyn Page) -> Result<Option<ElementRef>, BrowserError> {
    let allow = TagAllowList::text_inputs();
    let contexts = match page.contexts().await {
        Ok(contexts) => contexts,
        Err(e) if e.is_fatal_to_page() => return Err(e),
        Err(_) => return Ok(None),
    };
    for context in contexts {
        let elements = match page.elements(context, &allow).await {
            Ok(elements) => elements,
            Err(e) if e.is_fatal_to_page() => return Err(e),
            Err(_) => continue,
        };
        if let Some(field) = elements.iter().find(|e| e.visible) {
            return Ok(Some(ElementRef {
                context,
                index: field.index,
                allow,
            }));
        }
    }
    Ok(None)
}

/// Keep a "clicked but nothing happened" over a "not found": it says more
/// about what the page is doing.
fn prefer_informative(kept: Option<BrowserError>, new: BrowserError) -> BrowserError {
    match kept {
        Some(kept @ BrowserError::NoObservableChange { .. })
            if matches!(new, BrowserError::ElementNotFound { .. }) =>
        {
            kept
        }
        _ => new,
    }
}

/// Plain label walk with the default allow-list.
pub struct Generic;

impl SiteStrategy for Generic {
    fn kind(&self) -> SiteKind {
        SiteKind::Generic
    }
}

/// e-kanagawa portal. Menu entries are anchors, form steps are submit
/// buttons and facility choices are labelled radios, so narrow lists go first.
///
/// Facility lists are long; when the page offers a search box the facility
/// name is searched before it is clicked, and a name the portal abbreviates
/// is retried word by word.
pub struct Ekanagawa;

impl SiteStrategy for Ekanagawa {
    fn kind(&self) -> SiteKind {
        SiteKind::Ekanagawa
    }

    fn searches_last_step(&self) -> bool {
        true
    }

    fn splits_labels(&self) -> bool {
        true
    }

    fn step_allow_lists(&self, engine: &ClickEngine) -> Vec<TagAllowList> {
        vec![
            TagAllowList::links(),
            TagAllowList::buttons(),
            TagAllowList::labels(),
            engine.allow.clone(),
        ]
    }
}

/// Chigasaki calendar: the configured URL already shows the calendar.
pub struct Chigasaki;

impl SiteStrategy for Chigasaki {
    fn kind(&self) -> SiteKind {
        SiteKind::Chigasaki
    }

    fn walks_path(&self) -> bool {
        false
    }
}

pub fn strategy_for(kind: SiteKind) -> &'static dyn SiteStrategy {
    static GENERIC: Generic = Generic;
    static EKANAGAWA: Ekanagawa = Ekanagawa;
    static CHIGASAKI: Chigasaki = Chigasaki;
    match kind {
        SiteKind::Generic => &GENERIC,
        SiteKind::Ekanagawa => &EKANAGAWA,
        SiteKind::Chigasaki => &CHIGASAKI,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{Effect, MemoryDocument, MemoryElement, MemoryPage};

    const TOP: &str = "https://yoyaku.example.jp/";
    const MENU: &str = "https://yoyaku.example.jp/menu";
    const CAL: &str = "https://yoyaku.example.jp/cal";

    fn engine() -> ClickEngine {
        ClickEngine::default().with_settle(Duration::ZERO, Duration::ZERO)
    }

    fn path(steps: &[&[&str]]) -> Vec<StepQuery> {
        steps
            .iter()
            .map(|alts| StepQuery::AnyOf(alts.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    async fn portal() -> MemoryPage {
        let page = MemoryPage::new()
            .document(
                TOP,
                MemoryDocument::new()
                    .with(MemoryElement::link("施設予約").on_click(Effect::Navigate(MENU.into()))),
            )
            .document(
                MENU,
                MemoryDocument::new()
                    .with(MemoryElement::span("庭球場"))
                    .with(MemoryElement::submit("庭球場").on_click(Effect::Navigate(CAL.into()))),
            )
            .document(CAL, MemoryDocument::new().region("#cal", "01/05 空き"));
        page.goto(TOP, Duration::from_secs(1)).await.unwrap();
        page
    }

    #[tokio::test(start_paused = true)]
    async fn generic_walks_every_step() {
        let page = portal().await;
        strategy_for(SiteKind::Generic)
            .walk_path(&page, &engine(), &path(&[&["施設予約"], &["テニス", "庭球"]]))
            .await
            .unwrap();
        assert_eq!(page.current_url(), CAL);
    }

    #[tokio::test(start_paused = true)]
    async fn ekanagawa_prefers_narrow_lists() {
        let page = portal().await;
        strategy_for(SiteKind::Ekanagawa)
            .walk_path(&page, &engine(), &path(&[&["施設予約"], &["庭球"]]))
            .await
            .unwrap();
        assert_eq!(page.current_url(), CAL);
        // The span sharing the label is never clicked.
        assert_eq!(page.clicks(), vec!["施設予約".to_string(), "庭球場".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn chigasaki_ignores_path() {
        let page = portal().await;
        strategy_for(SiteKind::Chigasaki)
            .walk_path(&page, &engine(), &path(&[&["施設予約"]]))
            .await
            .unwrap();
        assert!(page.clicks().is_empty());
        assert_eq!(page.current_url(), TOP);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_step_fails_the_walk() {
        let page = portal().await;
        let err = strategy_for(SiteKind::Generic)
            .walk_path(&page, &engine(), &path(&[&["施設予約"], &["野球場"]]))
            .await
            .unwrap_err();
        match err {
            BrowserError::ElementNotFound { queries } => assert_eq!(queries, vec!["野球場"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    async fn search_portal() -> MemoryPage {
        const SEARCH: &str = "https://yoyaku.example.jp/search";
        const RESULTS: &str = "https://yoyaku.example.jp/results";
        let page = MemoryPage::new()
            .document(
                TOP,
                MemoryDocument::new().with(
                    MemoryElement::link("施設予約").on_click(Effect::Navigate(SEARCH.into())),
                ),
            )
            .document(
                SEARCH,
                MemoryDocument::new()
                    .with(MemoryElement::text_input())
                    .with(MemoryElement::submit("検索").on_click(Effect::Navigate(RESULTS.into()))),
            )
            .document(
                RESULTS,
                MemoryDocument::new().with(
                    MemoryElement::link("海老名運動公園").on_click(Effect::Navigate(CAL.into())),
                ),
            )
            .document(CAL, MemoryDocument::new().region("#cal", "01/05 空き"));
        page.goto(TOP, Duration::from_secs(1)).await.unwrap();
        page
    }

    #[tokio::test(start_paused = true)]
    async fn ekanagawa_searches_then_retries_by_word() {
        let page = search_portal().await;
        strategy_for(SiteKind::Ekanagawa)
            .walk_path(&page, &engine(), &path(&[&["施設予約"], &["海老名 運動公園"]]))
            .await
            .unwrap();
        assert_eq!(page.current_url(), CAL);
        assert_eq!(page.fills(), vec!["海老名 運動公園".to_string()]);
        assert_eq!(
            page.clicks(),
            vec![
                "施設予約".to_string(),
                "検索".to_string(),
                "海老名運動公園".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn generic_never_types() {
        let page = search_portal().await;
        let err = strategy_for(SiteKind::Generic)
            .walk_path(&page, &engine(), &path(&[&["施設予約"], &["海老名 運動公園"]]))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::ElementNotFound { .. }), "{err}");
        assert!(page.fills().is_empty());
    }

    #[test]
    fn words_of_multi_word_labels() {
        let alternatives = vec![
            "海老名 運動公園".to_string(),
            "庭球場".to_string(),
            "運動公園\u{3000}テニス".to_string(),
        ];
        assert_eq!(split_words(&alternatives), vec!["海老名", "運動公園", "テニス"]);
    }

    #[test]
    fn informative_error_kept() {
        let kept = prefer_informative(
            Some(BrowserError::NoObservableChange { label: "a".into() }),
            BrowserError::ElementNotFound { queries: vec![] },
        );
        assert!(matches!(kept, BrowserError::NoObservableChange { .. }));
    }
}
