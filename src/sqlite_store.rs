//! SQLite-backed [`DictionaryStore`] implementation.
//!
//! Maps each tier onto one SQL statement against the installed schema
//! (`entries`, `glosses`, `glosses_fts`). Tier 2 uses FTS5 with a quoted
//! phrase-prefix query ranked by `bm25`; tier 3 uses an escaped `LIKE`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lexibridge_core::models::{DictionaryEntry, Gloss};
use lexibridge_core::ranking::sort_hits;
use lexibridge_core::store::{DictionaryStore, GlossHit};
use lexibridge_core::text::{fts_phrase_query, like_prefix_pattern};
use lexibridge_core::LookupError;

use crate::error::db_err;

const SELECT_COLUMNS: &str = r#"
    e.id AS entry_id, e.kanji, e.kana, e.is_common, e.priority,
    g.id AS gloss_id, g.gloss_text, g.gloss_normalized, g.part_of_speech, g.sense_index
"#;

const TIER_ORDER: &str = r#"
    e.priority DESC, e.is_common DESC, (e.kanji IS NULL) ASC,
    g.sense_index ASC, length(e.kana) ASC
"#;

/// SQLite implementation of [`DictionaryStore`].
pub struct SqliteDictionaryStore {
    pool: SqlitePool,
    fulltext: bool,
    queries: AtomicU64,
}

impl SqliteDictionaryStore {
    /// Wrap an open pool, probing once for the FTS5 index.
    pub async fn open(pool: SqlitePool) -> Self {
        let fulltext = probe_fulltext(&pool).await;
        if !fulltext {
            tracing::debug!("glosses_fts unavailable; prefix tier will be used");
        }
        Self {
            pool,
            fulltext,
            queries: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, sql: &str, binds: &[&str], limit: i64) -> Result<Vec<SqliteRow>, LookupError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut query = sqlx::query(sql);
        for b in binds {
            query = query.bind(*b);
        }
        query.bind(limit).fetch_all(&self.pool).await.map_err(db_err)
    }
}

async fn probe_fulltext(pool: &SqlitePool) -> bool {
    let exists: Result<bool, sqlx::Error> = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='glosses_fts'",
    )
    .fetch_one(pool)
    .await;
    if !matches!(exists, Ok(true)) {
        return false;
    }
    // Fails when the runtime was built without FTS5.
    sqlx::query("SELECT rowid FROM glosses_fts WHERE glosses_fts MATCH '\"probe\"*' LIMIT 1")
        .fetch_all(pool)
        .await
        .is_ok()
}

fn hit_from_row(row: &SqliteRow, with_rank: bool) -> Result<GlossHit, sqlx::Error> {
    let entry_id: i64 = row.try_get("entry_id")?;
    let is_common: i64 = row.try_get("is_common")?;
    let rank = if with_rank {
        Some(row.try_get::<f64, _>("fts_rank")?)
    } else {
        None
    };
    Ok(GlossHit {
        entry: DictionaryEntry {
            id: entry_id,
            kanji: row.try_get("kanji")?,
            kana: row.try_get("kana")?,
            is_common: is_common != 0,
            priority: row.try_get("priority")?,
        },
        gloss: Gloss {
            id: row.try_get("gloss_id")?,
            entry_id,
            gloss_text: row.try_get("gloss_text")?,
            gloss_normalized: row.try_get("gloss_normalized")?,
            part_of_speech: row.try_get("part_of_speech")?,
            sense_index: row.try_get("sense_index")?,
        },
        rank,
    })
}

fn hits_from_rows(rows: &[SqliteRow], with_rank: bool) -> Result<Vec<GlossHit>, LookupError> {
    rows.iter()
        .map(|r| hit_from_row(r, with_rank))
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)
}

#[async_trait]
impl DictionaryStore for SqliteDictionaryStore {
    fn supports_fulltext(&self) -> bool {
        self.fulltext
    }

    async fn verify_schema(&self) -> Result<(), LookupError> {
        let corrupted = |detail: String| {
            LookupError::Database(format!(
                "dictionary database is corrupted or incomplete ({}); reinstall the dictionary",
                detail
            ))
        };

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('entries', 'glosses')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| corrupted(e.to_string()))?;
        if tables != 2 {
            return Err(corrupted("missing entries/glosses tables".to_string()));
        }

        sqlx::query("SELECT id FROM entries LIMIT 1")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| corrupted(e.to_string()))?;
        Ok(())
    }

    async fn exact_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM glosses g JOIN entries e ON e.id = g.entry_id \
             WHERE g.gloss_normalized = ? ORDER BY {TIER_ORDER} LIMIT ?"
        );
        let rows = self.fetch(&sql, &[query], limit).await?;
        hits_from_rows(&rows, false)
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
        // Candidates are taken by relevance; tier ordering is applied after
        // the gloss-head post-filter.
        let sql = format!(
            "SELECT {SELECT_COLUMNS}, bm25(glosses_fts) AS fts_rank \
             FROM glosses_fts \
             JOIN glosses g ON g.id = glosses_fts.rowid \
             JOIN entries e ON e.id = g.entry_id \
             WHERE glosses_fts MATCH ? ORDER BY fts_rank LIMIT ?"
        );
        let phrase = fts_phrase_query(query);
        let rows = self.fetch(&sql, &[phrase.as_str()], limit).await?;
        let mut hits = hits_from_rows(&rows, true)?;
        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn prefix_matches(&self, query: &str, limit: i64) -> Result<Vec<GlossHit>, LookupError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM glosses g JOIN entries e ON e.id = g.entry_id \
             WHERE g.gloss_normalized LIKE ? ESCAPE '\\' ORDER BY {TIER_ORDER} LIMIT ?"
        );
        let pattern = like_prefix_pattern(query);
        let rows = self.fetch(&sql, &[pattern.as_str()], limit).await?;
        hits_from_rows(&rows, false)
    }

    async fn reverse_matches(
        &self,
        raw: &str,
        normalized_kana: &str,
    ) -> Result<Vec<GlossHit>, LookupError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM entries e JOIN glosses g ON g.entry_id = e.id \
             WHERE e.kanji = ? OR e.kana = ? ORDER BY {TIER_ORDER} LIMIT ?"
        );
        let rows = self.fetch(&sql, &[raw, normalized_kana], -1).await?;
        hits_from_rows(&rows, false)
    }

    fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}
