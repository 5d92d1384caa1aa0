//! Text normalization and input classification.
//!
//! - [`normalize_query`] — trimmed, whitespace-collapsed, lower-cased form
//!   used as the forward lookup key and cache key.
//! - [`normalize_kana`] — NFKC (full-width → half-width ASCII) followed by
//!   katakana → hiragana, used for the reverse lookup kana match.
//! - [`contains_japanese`] / [`detect_direction`] — script detection.
//! - [`classify_input`] — word-level (≤ 2 tokens) vs sentence-level.

use unicode_normalization::UnicodeNormalization;

use crate::models::{Direction, InputKind};

/// Inputs with at most this many whitespace-delimited tokens are word-level.
pub const MAX_WORD_TOKENS: usize = 2;

/// Trim, collapse internal whitespace, and lower-case.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Full-width → half-width (and other compatibility forms) via NFKC.
pub fn to_half_width(text: &str) -> String {
    text.nfkc().collect()
}

/// Map katakana (U+30A1..=U+30F6) onto the corresponding hiragana.
pub fn katakana_to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Normalize Japanese input for kana matching.
pub fn normalize_kana(text: &str) -> String {
    katakana_to_hiragana(to_half_width(text.trim()).as_str())
}

fn is_japanese_char(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'   // hiragana
        | '\u{30A0}'..='\u{30FF}' // katakana
        | '\u{31F0}'..='\u{31FF}' // katakana phonetic extensions
        | '\u{FF66}'..='\u{FF9F}' // half-width katakana
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{3005}'              // 々
    )
}

pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese_char)
}

/// Japanese script anywhere routes to JA→EN; otherwise EN→JA.
pub fn detect_direction(text: &str) -> Direction {
    if contains_japanese(text) {
        Direction::JaToEn
    } else {
        Direction::EnToJa
    }
}

pub fn classify_input(text: &str) -> InputKind {
    if text.split_whitespace().count() <= MAX_WORD_TOKENS {
        InputKind::Word
    } else {
        InputKind::Sentence
    }
}

/// Strip a leading infinitive marker ("to run" → "run") and leading punctuation
/// so that first-word comparisons see the head word of a gloss.
pub fn gloss_head(gloss_normalized: &str) -> &str {
    let trimmed = gloss_normalized.trim_start_matches(|c: char| !c.is_alphanumeric());
    match trimmed.strip_prefix("to ") {
        Some(rest) if !rest.trim().is_empty() => rest.trim_start(),
        _ => trimmed,
    }
}

/// First whitespace-delimited word of a gloss head, without trailing punctuation.
pub fn first_word(gloss_normalized: &str) -> &str {
    gloss_head(gloss_normalized)
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches(|c: char| !c.is_alphanumeric())
}

/// Build an FTS5 prefix query for `query`, quoting it as a single phrase.
pub fn fts_phrase_query(query: &str) -> String {
    format!("\"{}\"*", query.replace('"', "\"\""))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` prefix pattern.
pub fn like_prefix_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 1);
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
