//! Ranking, full-text post-filtering, and grouping of lookup rows.
//!
//! # Ordering
//!
//! Every tier orders rows by:
//!
//! 1. entry `priority` (desc)
//! 2. `is_common` (common first)
//! 3. kanji present before kana-only
//! 4. gloss `sense_index` (asc, primary meaning first)
//! 5. kana length (asc, shorter as a commonness proxy)
//!
//! Tier 2 additionally post-filters candidates on the gloss head (see
//! [`match_quality`]) and breaks remaining ties by full-text rank.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use crate::models::{LookupEntry, ReverseEntry, TranslateResult, TranslationSource};
use crate::store::GlossHit;
use crate::text::gloss_head;

/// Tier-1 ordering shared by all tiers.
pub fn compare_hits(a: &GlossHit, b: &GlossHit) -> Ordering {
    b.entry
        .priority
        .cmp(&a.entry.priority)
        .then(b.entry.is_common.cmp(&a.entry.is_common))
        .then(a.entry.kanji.is_none().cmp(&b.entry.kanji.is_none()))
        .then(a.gloss.sense_index.cmp(&b.gloss.sense_index))
        .then(
            a.entry
                .kana
                .chars()
                .count()
                .cmp(&b.entry.kana.chars().count()),
        )
}

fn compare_rank(a: &GlossHit, b: &GlossHit) -> Ordering {
    match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// How well a gloss head lines up with the query. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    /// The gloss is the query ("skill").
    Exact,
    /// A single-word inflection of the query ("skills").
    Inflected,
    /// The query is the leading word of a phrase ("skill set").
    LeadingWord,
    /// The leading word merely starts with the query ("skills inventory system").
    LeadingPrefix,
}

/// Classify a full-text candidate; `None` means the query only appears
/// mid-phrase and the row must be dropped.
pub fn match_quality(gloss_normalized: &str, query: &str) -> Option<MatchQuality> {
    let head = gloss_head(gloss_normalized);
    let rest = head.strip_prefix(query)?;
    if rest.is_empty() {
        Some(MatchQuality::Exact)
    } else if rest.starts_with(char::is_whitespace) {
        Some(MatchQuality::LeadingWord)
    } else if !rest.contains(char::is_whitespace) {
        Some(MatchQuality::Inflected)
    } else {
        Some(MatchQuality::LeadingPrefix)
    }
}

/// Post-filter tier-2 candidates to gloss-head matches, re-rank, and cap.
pub fn filter_fulltext_hits(hits: Vec<GlossHit>, query: &str, limit: usize) -> Vec<GlossHit> {
    let mut kept: Vec<(MatchQuality, GlossHit)> = hits
        .into_iter()
        .filter_map(|h| match_quality(&h.gloss.gloss_normalized, query).map(|q| (q, h)))
        .collect();
    kept.sort_by(|(qa, a), (qb, b)| {
        qa.cmp(qb)
            .then_with(|| compare_hits(a, b))
            .then_with(|| compare_rank(a, b))
    });
    kept.into_iter().take(limit).map(|(_, h)| h).collect()
}

/// Sort rows in place with the tier ordering (rank as final tie-break).
pub fn sort_hits(hits: &mut [GlossHit]) {
    hits.sort_by(|a, b| compare_hits(a, b).then_with(|| compare_rank(a, b)));
}

/// Deduplicate while keeping first-seen order.
pub fn dedup_preserving_order<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Group rows by entry id in query order, accumulating glosses per entry.
pub fn group_by_entry(hits: Vec<GlossHit>) -> Vec<LookupEntry> {
    let mut groups: Vec<LookupEntry> = Vec::new();
    for hit in hits {
        match groups.iter_mut().find(|g| g.entry.id == hit.entry.id) {
            Some(group) => {
                if !group.glosses.iter().any(|g| g.id == hit.gloss.id) {
                    group.glosses.push(hit.gloss);
                }
            }
            None => groups.push(LookupEntry {
                entry: hit.entry,
                glosses: vec![hit.gloss],
            }),
        }
    }
    groups
}

fn split_pos(pos: &str) -> impl Iterator<Item = String> + '_ {
    pos.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Build the forward result from grouped entries (best entry first).
pub fn summarize_forward(groups: &[LookupEntry]) -> Option<TranslateResult> {
    let best = groups.first()?;
    let readings = dedup_preserving_order(groups.iter().map(|g| g.entry.kana.clone()));
    let pos = dedup_preserving_order(
        best.glosses
            .iter()
            .filter_map(|g| g.part_of_speech.as_deref())
            .flat_map(split_pos),
    );
    Some(TranslateResult {
        text: best.entry.headword().to_string(),
        source: TranslationSource::Jmdict,
        readings: Some(readings),
        part_of_speech: if pos.is_empty() { None } else { Some(pos) },
        is_common: Some(best.entry.is_common),
        detected_language: Some("en".to_string()),
    })
}

/// Group reverse-lookup rows per entry with deduplicated meanings and POS.
pub fn group_reverse(hits: Vec<GlossHit>) -> Vec<ReverseEntry> {
    group_by_entry(hits)
        .into_iter()
        .map(|group| {
            let mut glosses = group.glosses;
            glosses.sort_by_key(|g| g.sense_index);
            ReverseEntry {
                entry_id: group.entry.id,
                kanji: group.entry.kanji,
                kana: group.entry.kana,
                is_common: group.entry.is_common,
                meanings: dedup_preserving_order(glosses.iter().map(|g| g.gloss_text.clone())),
                parts_of_speech: dedup_preserving_order(
                    glosses
                        .iter()
                        .filter_map(|g| g.part_of_speech.as_deref())
                        .flat_map(split_pos),
                ),
            }
        })
        .collect()
}

/// Build the Japanese → English result from the best reverse entry.
pub fn summarize_reverse(entries: &[ReverseEntry]) -> Option<TranslateResult> {
    let best = entries.first()?;
    Some(TranslateResult {
        text: best.meanings.join("; "),
        source: TranslationSource::Jmdict,
        readings: Some(dedup_preserving_order(entries.iter().map(|e| e.kana.clone()))),
        part_of_speech: if best.parts_of_speech.is_empty() {
            None
        } else {
            Some(best.parts_of_speech.clone())
        },
        is_common: Some(best.is_common),
        detected_language: Some("ja".to_string()),
    })
}
