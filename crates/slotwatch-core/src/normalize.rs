//! Text canonicalisation for comparing on-page labels.
//!
//! Japanese reservation sites mix full-width and half-width forms freely:
//! the same button may read "検索" in one frame and "検 索" in another, a court
//! may be "コートＡ" in a table cell and "コートA" in a heading. Every text
//! comparison in slotwatch goes through [`normalize`] first.

/// Offset between a full-width ASCII variant (U+FF01..=U+FF5E) and its
/// half-width counterpart.
const FULLWIDTH_OFFSET: u32 = 0xFEE0;

/// Canonicalise a string for comparison.
///
/// - Full-width Latin letters and digits (`Ａ`–`Ｚ`, `ａ`–`ｚ`, `０`–`９`) become
///   their ASCII equivalents.
/// - Every run of Unicode whitespace (including the ideographic space U+3000)
///   collapses to a single ASCII space.
/// - Leading and trailing whitespace is removed.
///
/// Total and idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().map(to_halfwidth));
    }
    out
}

/// Map a single full-width alphanumeric to ASCII; other characters pass through.
pub fn to_halfwidth(c: char) -> char {
    match c {
        'Ａ'..='Ｚ' | 'ａ'..='ｚ' | '０'..='９' => {
            char::from_u32(c as u32 - FULLWIDTH_OFFSET).unwrap_or(c)
        }
        _ => c,
    }
}
