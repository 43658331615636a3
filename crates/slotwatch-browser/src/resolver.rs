//! Element resolution: pick the one node a text query most likely means.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use slotwatch_core::normalize;
use tracing::debug;

use crate::page::{ContextId, ElementInfo, ElementRef, Page, TagAllowList};
use crate::BrowserError;

/// How to choose among equally scored candidates.
#[derive(Clone, Default)]
pub enum TieBreak {
    /// Earliest in document order.
    #[default]
    First,
    /// Uniform choice among the top tier.
    Random,
    /// Injected chooser; receives the tier size, returns an index into it.
    /// Out-of-range answers are clamped.
    Pick(Arc<dyn Fn(usize) -> usize + Send + Sync>),
}

impl TieBreak {
    fn choose(&self, tier: usize) -> usize {
        debug_assert!(tier > 0);
        match self {
            TieBreak::First => 0,
            TieBreak::Random => rand::rng().random_range(0..tier),
            TieBreak::Pick(f) => f(tier).min(tier - 1),
        }
    }
}

impl fmt::Debug for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::First => f.write_str("First"),
            TieBreak::Random => f.write_str("Random"),
            TieBreak::Pick(_) => f.write_str("Pick(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub element: ElementRef,
    /// The label (text, title, aria-label or alt) that matched.
    pub matched_text: String,
    pub score: i32,
}

// ── Scoring ──

const SCORE_LINK: i32 = 100;
const SCORE_BUTTON: i32 = 80;
const SCORE_ROLE_BUTTON: i32 = 70;
const SCORE_IMAGE: i32 = 50;
const SCORE_CHOICE: i32 = 40;
const SCORE_GENERIC: i32 = 10;

const BONUS_HREF: i32 = 15;
const BONUS_ONCLICK: i32 = 10;
const BONUS_POINTER: i32 = 5;

/// Semantic score of a node: how much it looks like something meant to be clicked.
pub fn score(info: &ElementInfo) -> i32 {
    let base = match info.tag.as_str() {
        "a" if info.has_href => SCORE_LINK,
        "button" => SCORE_BUTTON,
        "input" if info.is_input("submit") || info.is_input("button") => SCORE_BUTTON,
        _ if info.has_role("button") => SCORE_ROLE_BUTTON,
        "img" | "area" => SCORE_IMAGE,
        "input" if info.is_input("image") => SCORE_IMAGE,
        "option" | "label" | "a" => SCORE_CHOICE,
        _ => SCORE_GENERIC,
    };
    let mut bonus = 0;
    if info.has_href {
        bonus += BONUS_HREF;
    }
    if info.has_onclick {
        bonus += BONUS_ONCLICK;
    }
    if info.pointer_cursor {
        bonus += BONUS_POINTER;
    }
    base + bonus
}

/// The first label of `info` containing any of the (already normalized) queries.
fn matched_label(info: &ElementInfo, queries: &[String]) -> Option<String> {
    info.labels()
        .map(normalize)
        .find(|label| queries.iter().any(|q| label.contains(q.as_str())))
}

fn normalized_queries(queries: &[String]) -> Vec<String> {
    queries
        .iter()
        .map(|q| normalize(q))
        .filter(|q| !q.is_empty())
        .collect()
}

/// Best visible candidate among one context's elements.
pub fn best_candidate(
    context: ContextId,
    allow: &TagAllowList,
    elements: &[ElementInfo],
    queries: &[String],
    tie: &TieBreak,
) -> Option<Candidate> {
    let queries = normalized_queries(queries);
    if queries.is_empty() {
        return None;
    }

    let qualifying: Vec<(&ElementInfo, String, i32)> = elements
        .iter()
        .filter(|e| e.visible)
        .filter_map(|e| matched_label(e, &queries).map(|label| (e, label, score(e))))
        .collect();
    let top = qualifying.iter().map(|(_, _, s)| *s).max()?;
    let mut tier: Vec<_> = qualifying
        .into_iter()
        .filter(|(_, _, s)| *s == top)
        .collect();
    let pick = tie.choose(tier.len());
    let (info, matched_text, score) = tier.swap_remove(pick);
    Some(Candidate {
        element: ElementRef {
            context,
            index: info.index,
            allow: allow.clone(),
        },
        matched_text,
        score,
    })
}

/// Search the page's contexts in order and return the best candidate of the
/// first context that has any. Candidates are never merged across contexts.
///
/// A context that cannot be read (a frame detached mid-query, say) is skipped;
/// a lost connection is not.
pub async fn resolve<P: Page + ?Sized>(
    page: &P,
    queries: &[String],
    allow: &TagAllowList,
    tie: &TieBreak,
) -> Result<Option<Candidate>, BrowserError> {
    for context in page.contexts().await? {
        let elements = match page.elements(context, allow).await {
            Ok(elements) => elements,
            Err(e) if e.is_fatal_to_page() => return Err(e),
            Err(e) => {
                debug!(context, error = %e, "skipping unreadable context");
                continue;
            }
        };
        if let Some(candidate) = best_candidate(context, allow, &elements, queries, tie) {
            debug!(
                context,
                index = candidate.element.index,
                score = candidate.score,
                matched = %candidate.matched_text,
                "resolved candidate"
            );
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
