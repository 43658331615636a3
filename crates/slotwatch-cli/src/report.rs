//! Human-readable run report.

use slotwatch_core::scan::truncate_chars;

use crate::run::RunReport;

/// Subject of the fatal-error notification.
pub const ERROR_SUBJECT: &str = "【監視エラー】slotwatch";

/// Characters of page text quoted per target.
const EXCERPT_LIMIT: usize = 140;

pub fn subject(new_slots: usize) -> String {
    format!("【空き検知】{new_slots}件")
}

/// Plain-text report: header, one status line per target, then the new slots.
pub fn render(report: &RunReport) -> String {
    let mut lines = vec![
        format!(
            "実行時刻: {}",
            report.started.format("%Y-%m-%d %H:%M:%S %Z")
        ),
        format!(
            "対象 {} 件 / ヒット {} 件 / 新規 {} 件 / エラー {} 件",
            report.outcomes.len(),
            report.hits(),
            report.new_keys().count(),
            report.errors()
        ),
        String::new(),
    ];

    for outcome in &report.outcomes {
        let r = &outcome.result;
        match &r.error {
            Some(error) => lines.push(format!("× {}（{}）: ERROR {}", r.name, r.url, error)),
            None => {
                let mark = if r.hit { "✅" } else { "—" };
                let collapsed = r.sample.split_whitespace().collect::<Vec<_>>().join(" ");
                lines.push(format!("{mark} {}（{}） {}ms", r.name, r.url, r.elapsed_ms));
                lines.push(format!("   例: {}…", truncate_chars(&collapsed, EXCERPT_LIMIT)));
            }
        }
    }

    let fresh: Vec<String> = report.new_keys().map(|k| k.to_string()).collect();
    if !fresh.is_empty() {
        lines.push(String::new());
        lines.push("新規の空き:".to_string());
        lines.extend(fresh.into_iter().map(|k| format!("  {k}")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use slotwatch_core::{NotifiedKey, ScanResult};

    use super::*;
    use crate::run::TargetOutcome;

    fn sample_report() -> RunReport {
        let long_sample = format!("01/05(日)\n\n空き {}", "x".repeat(300));
        RunReport {
            started: chrono_tz::Asia::Tokyo
                .with_ymd_and_hms(2025, 1, 1, 6, 30, 0)
                .unwrap(),
            outcomes: vec![
                TargetOutcome {
                    result: ScanResult::completed(
                        "海老名",
                        "https://e.example.jp",
                        true,
                        &long_sample,
                        1200,
                    ),
                    new_keys: vec![NotifiedKey::new(
                        "海老名市",
                        "海老名運動公園",
                        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
                        "09:00-11:00",
                        "コートA",
                    )],
                },
                TargetOutcome {
                    result: ScanResult::completed(
                        "茅ヶ崎",
                        "https://c.example.jp",
                        false,
                        "満",
                        800,
                    ),
                    new_keys: vec![],
                },
                TargetOutcome {
                    result: ScanResult::failed("藤沢", "https://f.example.jp", "timeout", 25000),
                    new_keys: vec![],
                },
            ],
        }
    }

    #[test]
    fn subject_counts_new_slots() {
        assert_eq!(subject(3), "【空き検知】3件");
    }

    #[test]
    fn status_lines_per_target() {
        let text = render(&sample_report());
        assert!(text.starts_with("実行時刻: 2025-01-01 06:30:00 JST"), "{text}");
        assert!(text.contains("対象 3 件 / ヒット 1 件 / 新規 1 件 / エラー 1 件"));
        assert!(text.contains("✅ 海老名（https://e.example.jp） 1200ms"));
        assert!(text.contains("— 茅ヶ崎（https://c.example.jp） 800ms"));
        assert!(text.contains("× 藤沢（https://f.example.jp）: ERROR timeout"));
        assert!(text.contains("  海老名市|海老名運動公園|2025-01-05|09:00-11:00|コートA"));
    }

    #[test]
    fn excerpt_is_collapsed_and_bounded() {
        let text = render(&sample_report());
        let excerpt = text
            .lines()
            .find(|l| l.starts_with("   例: 01/05"))
            .unwrap();
        assert!(excerpt.contains("01/05(日) 空き"));
        let quoted = excerpt.trim_start_matches("   例: ").trim_end_matches('…');
        assert_eq!(quoted.chars().count(), EXCERPT_LIMIT);
    }
}
