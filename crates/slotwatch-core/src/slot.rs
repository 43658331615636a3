//! Slot identity: the dedup key of one notified availability slot.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::availability::OpenSlot;
use crate::normalize::normalize;
use crate::target::Target;

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([01]\d|2[0-3]):[0-5]\d-([01]\d|2[0-3]):[0-5]\d")
        .expect("valid time-range pattern")
});

static COURT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"コート[A-Za-z0-9]+|面\s*[A-Z]").expect("valid court pattern"));

/// Identity of a notified slot: `(location, facility, date, time range, court)`.
///
/// Rendered as the fields joined with `|`; that string is what the dedup
/// cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifiedKey {
    pub location: String,
    pub facility: String,
    pub date: NaiveDate,
    pub time_range: String,
    pub court: String,
}

impl NotifiedKey {
    pub fn new(
        location: impl Into<String>,
        facility: impl Into<String>,
        date: NaiveDate,
        time_range: impl Into<String>,
        court: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            facility: facility.into(),
            date,
            time_range: time_range.into(),
            court: court.into(),
        }
    }

    /// Key for an open slot found on `target`'s page.
    pub fn for_slot(target: &Target, slot: &OpenSlot) -> Self {
        let after_token = &slot.window[slot.token_offset..];
        let time_range = pick_time_range(after_token)
            .or_else(|| pick_time_range(&slot.window))
            .unwrap_or_default();
        let court = pick_court(&slot.window).unwrap_or_default();
        Self::new(
            target.location(),
            target.facility(),
            slot.date,
            time_range,
            court,
        )
    }

    /// Whether the key passes the target's `times` and `courts` filters.
    pub fn accepted_by(&self, target: &Target) -> bool {
        let time_ok = target.times.is_empty()
            || target
                .times
                .iter()
                .any(|t| normalize_dashes(&normalize(t)) == self.time_range);
        let court_ok = target.courts.is_empty()
            || target
                .courts
                .iter()
                .any(|c| self.court.contains(&normalize(c)));
        time_ok && court_ok
    }
}

impl fmt::Display for NotifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.location,
            self.facility,
            self.date.format("%Y-%m-%d"),
            self.time_range,
            self.court
        )
    }
}

fn normalize_dashes(s: &str) -> String {
    s.replace(['～', '〜', '~', '－', '―'], "-")
}

/// First `HH:MM-HH:MM` range in `text`, accepting wave-dash separators.
pub fn pick_time_range(text: &str) -> Option<String> {
    let text = normalize_dashes(&normalize(text)).replace(" - ", "-");
    TIME_RANGE.find(&text).map(|m| m.as_str().to_string())
}

/// Court label such as `コートA` or `面 B`.
pub fn pick_court(text: &str) -> Option<String> {
    let text = normalize(text);
    COURT.find(&text).map(|m| m.as_str().to_string())
}
