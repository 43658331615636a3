//! Date-windowed availability detection over flattened calendar text.
//!
//! Reservation calendars give no structured date → availability mapping once
//! their text is extracted. What they do reliably contain is a date string
//! near each cell and a vacancy marker ("空き", "○") near open cells. The
//! detector therefore:
//!
//! 1. enumerates every date from today to the end of the month after next
//!    that falls on a configured day of week,
//! 2. renders each date in the literal forms seen on such sites
//!    (`01/05`, `1/5`, `01-05`, `1月5日`, optionally followed by `(日)`),
//! 3. for every occurrence of a token, cuts a window of [`WINDOW_RADIUS`]
//!    characters either side and tests it against a case-insensitive
//!    alternation of the keywords.
//!
//! Windows of neighbouring dates may overlap, so a marker near one date can be
//! attributed to an adjacent date as well.

use chrono::{Datelike, NaiveDate, Weekday};
use regex::{Regex, RegexBuilder};

use crate::normalize::normalize;

/// Vacancy markers used when a target configures no keywords.
pub const DEFAULT_KEYWORDS: &[&str] = &["空き", "○", "◯", "予約可"];

/// Characters kept on each side of a date token.
pub const WINDOW_RADIUS: usize = 130;

/// A target date whose surrounding text carries a vacancy marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSlot {
    pub date: NaiveDate,
    /// The literal date form that matched.
    pub token: String,
    /// Normalised text around the match.
    pub window: String,
    /// Byte offset of the token inside `window`.
    pub token_offset: usize,
}

/// Last day of the month after next: the end of the scan horizon.
pub fn horizon_end(today: NaiveDate) -> NaiveDate {
    let months = today.year() * 12 + today.month0() as i32 + 3;
    NaiveDate::from_ymd_opt(months.div_euclid(12), months.rem_euclid(12) as u32 + 1, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(today)
}

/// Every date from `today` through [`horizon_end`] falling on one of `weekdays`.
pub fn target_dates(today: NaiveDate, weekdays: &[Weekday]) -> Vec<NaiveDate> {
    let end = horizon_end(today);
    today
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| weekdays.contains(&d.weekday()))
        .collect()
}

/// Japanese single-character day-of-week marker.
pub fn weekday_ja(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "月",
        Weekday::Tue => "火",
        Weekday::Wed => "水",
        Weekday::Thu => "木",
        Weekday::Fri => "金",
        Weekday::Sat => "土",
        Weekday::Sun => "日",
    }
}

/// Literal renderings of `date` as they appear on reservation calendars.
pub fn date_tokens(date: NaiveDate) -> Vec<String> {
    let (y, m, d) = (date.year(), date.month(), date.day());
    let wd = weekday_ja(date.weekday());

    let mut bases = vec![
        format!("{y}/{m:02}/{d:02}"),
        format!("{y}-{m:02}-{d:02}"),
        format!("{y}/{m}/{d}"),
        format!("{m:02}/{d:02}"),
        format!("{m}/{d}"),
        format!("{m:02}-{d:02}"),
        format!("{m}-{d}"),
        format!("{m}月{d}日"),
    ];
    dedup_in_order(&mut bases);

    let mut tokens = Vec::with_capacity(bases.len() * 3);
    for base in bases {
        tokens.push(format!("{base}({wd})"));
        tokens.push(format!("{base}（{wd}）"));
        tokens.push(base);
    }
    tokens
}

fn dedup_in_order(v: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    v.retain(|s| seen.insert(s.clone()));
}

/// Keyword proximity detector for one target's day-of-week and keyword policy.
#[derive(Debug, Clone)]
pub struct Detector {
    keywords: Regex,
    weekdays: Vec<Weekday>,
    radius: usize,
}

impl Detector {
    /// Build a detector. Empty `keywords` falls back to [`DEFAULT_KEYWORDS`],
    /// empty `weekdays` to Sunday.
    pub fn new(keywords: &[String], weekdays: &[Weekday]) -> Result<Self, regex::Error> {
        let mut alternatives: Vec<String> = keywords
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(&k))
            .collect();
        if alternatives.is_empty() {
            alternatives = DEFAULT_KEYWORDS.iter().map(|k| regex::escape(k)).collect();
        }
        let keywords = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        let weekdays = if weekdays.is_empty() {
            vec![Weekday::Sun]
        } else {
            weekdays.to_vec()
        };
        Ok(Self {
            keywords,
            weekdays,
            radius: WINDOW_RADIUS,
        })
    }

    pub fn with_radius(mut self, radius: usize) -> Self {
        self.radius = radius;
        self
    }

    /// True if any target date within the horizon has a keyword in its window.
    pub fn is_open(&self, text: &str, today: NaiveDate) -> bool {
        let text = normalize(text);
        target_dates(today, &self.weekdays)
            .into_iter()
            .any(|date| self.first_match(&text, date).is_some())
    }

    /// All target dates with a positive window, in date order, one slot per date.
    pub fn open_slots(&self, text: &str, today: NaiveDate) -> Vec<OpenSlot> {
        let text = normalize(text);
        target_dates(today, &self.weekdays)
            .into_iter()
            .filter_map(|date| self.first_match(&text, date))
            .collect()
    }

    fn first_match(&self, text: &str, date: NaiveDate) -> Option<OpenSlot> {
        for token in date_tokens(date) {
            for (pos, _) in text.match_indices(token.as_str()) {
                if !standalone(text, pos, token.len()) {
                    continue;
                }
                let (window, token_offset) = window_around(text, pos, token.len(), self.radius);
                if self.keywords.is_match(window) {
                    return Some(OpenSlot {
                        date,
                        token,
                        window: window.to_string(),
                        token_offset,
                    });
                }
            }
        }
        None
    }
}

/// Convenience predicate with the default keyword set when `keywords` is empty
/// and Sunday as the target day.
pub fn is_open_on_target_days(text: &str, keywords: &[String], today: NaiveDate) -> bool {
    match Detector::new(keywords, &[Weekday::Sun]) {
        Ok(detector) => detector.is_open(text, today),
        Err(_) => false,
    }
}

/// A token must not be glued to further digits (`1/5` inside `11/5` or `1/50`).
fn standalone(text: &str, pos: usize, len: usize) -> bool {
    let before = text[..pos].chars().next_back();
    let after = text[pos + len..].chars().next();
    !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
}

/// Slice of `text` holding up to `radius` characters before and after the
/// token at `start..start + len`, with the token's offset inside the slice.
fn window_around(text: &str, start: usize, len: usize, radius: usize) -> (&str, usize) {
    let begin = match radius.checked_sub(1) {
        None => start,
        Some(n) => text[..start]
            .char_indices()
            .rev()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(0),
    };
    let after = start + len;
    let end = text[after..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| after + i)
        .unwrap_or(text.len());
    (&text[begin..end], start - begin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn defaults() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn horizon_ends_at_month_after_next() {
        assert_eq!(horizon_end(ymd(2025, 1, 1)), ymd(2025, 3, 31));
        assert_eq!(horizon_end(ymd(2025, 11, 15)), ymd(2026, 1, 31));
        assert_eq!(horizon_end(ymd(2025, 12, 31)), ymd(2026, 2, 28));
        assert_eq!(horizon_end(ymd(2023, 12, 1)), ymd(2024, 2, 29));
    }

    #[test]
    fn target_dates_are_exactly_the_sundays() {
        let today = ymd(2025, 1, 1);
        let dates = target_dates(today, &[Weekday::Sun]);
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Sun));

        let expected: Vec<NaiveDate> = today
            .iter_days()
            .take_while(|d| *d <= ymd(2025, 3, 31))
            .filter(|d| d.weekday() == Weekday::Sun)
            .collect();
        assert_eq!(dates, expected);
        assert_eq!(dates.first(), Some(&ymd(2025, 1, 5)));
        assert_eq!(dates.last(), Some(&ymd(2025, 3, 30)));
        assert_eq!(dates.len(), 13);
        assert!(dates.contains(&ymd(2025, 2, 2)));
    }

    #[test]
    fn today_counts_when_it_matches() {
        let sunday = ymd(2025, 1, 5);
        assert_eq!(target_dates(sunday, &[Weekday::Sun])[0], sunday);
    }

    #[test]
    fn tokens_cover_padded_and_unpadded_forms() {
        let tokens = date_tokens(ymd(2025, 1, 5));
        for expected in [
            "01/05", "1/5", "01-05", "1-5", "01/05(日)", "1/5（日）", "2025/01/05", "2025-01-05",
            "1月5日", "1月5日(日)",
        ] {
            assert!(tokens.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn tokens_deduplicate_two_digit_dates() {
        let tokens = date_tokens(ymd(2025, 11, 23));
        let plain = tokens.iter().filter(|t| t.as_str() == "11/23").count();
        assert_eq!(plain, 1);
    }

    #[test]
    fn open_marker_near_first_sunday_wins() {
        let text = "カレンダー 01/05 空き あり……2月の予定: 02/02 満";
        assert!(is_open_on_target_days(text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn full_marker_alone_is_not_open() {
        let text = "2月の予定: 02/02 満";
        assert!(!is_open_on_target_days(text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn marker_on_other_weekday_is_ignored() {
        // 01/06 is a Monday.
        let filler = "・".repeat(300);
        let text = format!("01/06 空き{filler}01/05 満");
        assert!(!is_open_on_target_days(&text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn marker_outside_window_is_ignored() {
        let filler = "x".repeat(WINDOW_RADIUS + 5);
        let text = format!("01/05{filler}空き");
        assert!(!is_open_on_target_days(&text, &defaults(), ymd(2025, 1, 1)));

        let text = format!("01/05{}空き", "x".repeat(WINDOW_RADIUS - 10));
        assert!(is_open_on_target_days(&text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn marker_before_token_counts() {
        let text = "○ 1/5(日) 10:00-12:00";
        assert!(is_open_on_target_days(text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn digit_glued_token_does_not_match() {
        // "1/5" inside "11/5" must not count as January 5th.
        let text = "11/5 空き";
        assert!(!is_open_on_target_days(text, &defaults(), ymd(2025, 1, 1)));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let kw = vec!["OPEN".to_string()];
        assert!(is_open_on_target_days("2025-01-05 open", &kw, ymd(2025, 1, 1)));
    }

    #[test]
    fn fullwidth_text_is_normalised() {
        let detector = Detector::new(&["ａｖａｉｌ".to_string()], &[Weekday::Sun]).unwrap();
        assert!(detector.is_open("１/５ AVAIL", ymd(2025, 1, 1)));
    }

    #[test]
    fn open_slots_one_per_date() {
        let detector = Detector::new(&[], &[Weekday::Sun]).unwrap();
        let text = "01/05(日) 09:00～11:00 空き / 1/12 ○ / 01/19 ×";
        let slots = detector.open_slots(text, ymd(2025, 1, 1));
        let dates: Vec<NaiveDate> = slots.iter().map(|s| s.date).collect();
        // 01/19's window reaches back to the "○" of 1/12: overlapping windows count.
        assert_eq!(dates, vec![ymd(2025, 1, 5), ymd(2025, 1, 12), ymd(2025, 1, 19)]);
        assert_eq!(slots[0].token, "01/05(日)");
        assert!(slots[0].window[slots[0].token_offset..].starts_with("01/05(日)"));
    }

    #[test]
    fn custom_weekdays() {
        let detector = Detector::new(&[], &[Weekday::Sat]).unwrap();
        // 2025-01-04 is a Saturday, 01/05 a Sunday.
        assert!(detector.is_open("01/04 空き", ymd(2025, 1, 1)));
        assert!(!detector.is_open("01/05 空き", ymd(2025, 1, 1)));
    }

    #[test]
    fn window_is_char_safe() {
        let text = "空空空01/05空空空";
        let start = text.find("01/05").unwrap();
        let (w, off) = window_around(text, start, 5, 2);
        assert_eq!(w, "空空01/05空空");
        assert_eq!(&w[off..off + 5], "01/05");
    }
}
