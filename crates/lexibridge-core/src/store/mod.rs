//! Storage abstraction for the lookup engine.
//!
//! The [`DictionaryStore`] trait defines the queries the tiered lookup
//! needs, enabling pluggable backends (SQLite with FTS5 in the native
//! crate, [`memory::InMemoryDictionaryStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::LookupError;
use crate::models::{DictionaryEntry, Gloss};

/// One matching gloss row joined with its entry.
///
/// Carries enough information to rank, post-filter, and group results
/// without additional round-trips.
#[derive(Debug, Clone, PartialEq)]
pub struct GlossHit {
    pub entry: DictionaryEntry,
    pub gloss: Gloss,
    /// Full-text relevance (lower is better, as with FTS5 `bm25`); `None` outside tier 2.
    pub rank: Option<f64>,
}

/// Abstract dictionary backend.
///
/// # Operations
///
/// | Method | Tier |
/// |--------|------|
/// | [`exact_matches`](DictionaryStore::exact_matches) | 1 — normalized gloss equals the query |
/// | [`fulltext_matches`](DictionaryStore::fulltext_matches) | 2 — ranked full-text candidates |
/// | [`prefix_matches`](DictionaryStore::prefix_matches) | 3 — `LIKE 'query%'` portability fallback |
/// | [`reverse_matches`](DictionaryStore::reverse_matches) | Japanese → English exact match |
///
/// Every tier returns rows already ordered best-first.
#[async_trait]
pub trait DictionaryStore: Send + Sync {
    /// Whether tier 2 is available in this runtime.
    fn supports_fulltext(&self) -> bool;

    /// Lightweight schema-presence check run before the store is used.
    async fn verify_schema(&self) -> Result<(), LookupError>;

    async fn exact_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError>;

    async fn fulltext_matches(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<GlossHit>, LookupError>;

    async fn prefix_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError>;

    /// Rows whose entry has `kanji = raw` or `kana = normalized_kana`.
    async fn reverse_matches(
        &self,
        raw: &str,
        normalized_kana: &str,
    ) -> Result<Vec<GlossHit>, LookupError>;

    /// Number of queries issued so far (instrumentation hook).
    fn query_count(&self) -> u64;
}
