//! In-memory [`DictionaryStore`] implementation for testing.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Full-text search is emulated by
//! matching the query as a phrase prefix at any word boundary of the gloss,
//! which mirrors FTS5's `"query"*` semantics closely enough for ranking
//! tests. Construct with [`InMemoryDictionaryStore::with_fulltext`]`(false)`
//! to exercise the prefix tier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;

use crate::error::LookupError;
use crate::models::{DictionaryEntry, Gloss};
use crate::ranking::sort_hits;

use super::{DictionaryStore, GlossHit};

/// In-memory dictionary for tests.
pub struct InMemoryDictionaryStore {
    entries: RwLock<Vec<DictionaryEntry>>,
    glosses: RwLock<Vec<Gloss>>,
    fulltext: bool,
    queries: AtomicU64,
}

impl InMemoryDictionaryStore {
    pub fn new() -> Self {
        Self::with_fulltext(true)
    }

    pub fn with_fulltext(fulltext: bool) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            glosses: RwLock::new(Vec::new()),
            fulltext,
            queries: AtomicU64::new(0),
        }
    }

    /// Add an entry with its glosses, given as `(text, part_of_speech)` in sense order.
    pub fn insert_entry(&self, entry: DictionaryEntry, glosses: &[(&str, Option<&str>)]) {
        let mut stored = self.glosses.write().unwrap_or_else(|e| e.into_inner());
        for (sense_index, (text, pos)) in glosses.iter().enumerate() {
            let id = stored.len() as i64 + 1;
            stored.push(Gloss {
                id,
                entry_id: entry.id,
                gloss_text: text.to_string(),
                gloss_normalized: text.to_lowercase(),
                part_of_speech: pos.map(str::to_string),
                sense_index: sense_index as i64,
            });
        }
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<DictionaryEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn read_glosses(&self) -> RwLockReadGuard<'_, Vec<Gloss>> {
        self.glosses.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Join glosses accepted by `keep` with their entries, ordered and capped.
    fn select<F>(&self, limit: i64, keep: F) -> Vec<GlossHit>
    where
        F: Fn(&DictionaryEntry, &Gloss) -> Option<Option<f64>>,
    {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let entries = self.read_entries();
        let glosses = self.read_glosses();
        let mut hits: Vec<GlossHit> = glosses
            .iter()
            .filter_map(|g| {
                let entry = entries.iter().find(|e| e.id == g.entry_id)?;
                let rank = keep(entry, g)?;
                Some(GlossHit {
                    entry: entry.clone(),
                    gloss: g.clone(),
                    rank,
                })
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(limit.max(0) as usize);
        hits
    }
}

impl Default for InMemoryDictionaryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Phrase-prefix match at a word boundary; rank favours earlier, tighter matches.
fn phrase_prefix_rank(gloss: &str, query: &str) -> Option<f64> {
    let mut boundary = true;
    for (i, c) in gloss.char_indices() {
        if boundary && gloss[i..].starts_with(query) {
            return Some(-(query.len() as f64) / (gloss.len() as f64 + i as f64));
        }
        boundary = !c.is_alphanumeric();
    }
    None
}

#[async_trait]
impl DictionaryStore for InMemoryDictionaryStore {
    fn supports_fulltext(&self) -> bool {
        self.fulltext
    }

    async fn verify_schema(&self) -> Result<(), LookupError> {
        Ok(())
    }

    async fn exact_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError> {
        Ok(self.select(limit, |_, g| (g.gloss_normalized == query).then_some(None)))
    }

    async fn fulltext_matches(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<GlossHit>, LookupError> {
        if !self.fulltext {
            return Err(LookupError::Database(
                "full-text search is not available".to_string(),
            ));
        }
        Ok(self.select(limit, |_, g| {
            phrase_prefix_rank(&g.gloss_normalized, query).map(Some)
        }))
    }

    async fn prefix_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError> {
        Ok(self.select(limit, |_, g| g.gloss_normalized.starts_with(query).then_some(None)))
    }

    async fn reverse_matches(
        &self,
        raw: &str,
        normalized_kana: &str,
    ) -> Result<Vec<GlossHit>, LookupError> {
        Ok(self.select(i64::MAX, |e, _| {
            (e.kanji.as_deref() == Some(raw) || e.kana == normalized_kana).then_some(None)
        }))
    }

    fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}
