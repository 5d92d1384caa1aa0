use anyhow::Result;
use sqlx::SqlitePool;

/// Create the dictionary schema: entries, glosses, and the glosses FTS5 index.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY,
            kanji TEXT,
            kana TEXT NOT NULL,
            is_common INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS glosses (
            id INTEGER PRIMARY KEY,
            entry_id INTEGER NOT NULL,
            gloss_text TEXT NOT NULL,
            gloss_normalized TEXT NOT NULL,
            part_of_speech TEXT,
            sense_index INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (entry_id) REFERENCES entries(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bundle_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='glosses_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE glosses_fts USING fts5(
                gloss_normalized,
                content='glosses',
                content_rowid='id'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_glosses_normalized ON glosses(gloss_normalized)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_glosses_entry_id ON glosses(entry_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_kanji ON entries(kanji)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_kana ON entries(kana)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Rebuild the external-content FTS index from `glosses`.
pub async fn rebuild_fulltext(pool: &SqlitePool) -> Result<()> {
    sqlx::query("INSERT INTO glosses_fts(glosses_fts) VALUES('rebuild')")
        .execute(pool)
        .await?;
    Ok(())
}
