//! Publishing side: build a dictionary database from jmdict-simplified JSON
//! and pack it into a distributable gzip bundle with `metadata.json`.
//!
//! ```bash
//! lexi build --jmdict jmdict-eng-3.5.0.json --out dist/dictionary.sqlite
//! lexi pack --db dist/dictionary.sqlite --out-dir public/ --version 2024.06.01
//! ```
//!
//! The produced bundle is exactly what the distribution manager downloads.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;

use lexibridge_core::models::DictionaryMetadata;

use crate::{db, migrate};

// ============ jmdict-simplified input ============

#[derive(Debug, Deserialize)]
struct JmdictFile {
    #[serde(default)]
    version: String,
    words: Vec<JmdictWord>,
}

#[derive(Debug, Deserialize)]
struct JmdictWord {
    id: String,
    #[serde(default)]
    kanji: Vec<JmdictWriting>,
    #[serde(default)]
    kana: Vec<JmdictWriting>,
    #[serde(default)]
    sense: Vec<JmdictSense>,
}

#[derive(Debug, Deserialize)]
struct JmdictWriting {
    text: String,
    #[serde(default)]
    common: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JmdictSense {
    #[serde(default)]
    part_of_speech: Vec<String>,
    #[serde(default)]
    gloss: Vec<JmdictGloss>,
}

#[derive(Debug, Deserialize)]
struct JmdictGloss {
    #[serde(default = "default_lang")]
    lang: String,
    text: String,
}

fn default_lang() -> String {
    "eng".to_string()
}

// ============ Build rows ============

#[derive(Debug, Clone, PartialEq)]
pub struct BuildGloss {
    pub text: String,
    pub part_of_speech: Option<String>,
    pub sense_index: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildEntry {
    pub id: i64,
    pub kanji: Option<String>,
    pub kana: String,
    pub is_common: bool,
    pub priority: i64,
    pub glosses: Vec<BuildGloss>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub entries: usize,
    pub glosses: usize,
}

/// Convert one jmdict-simplified word; `None` when it has no kana or no English gloss.
fn convert_word(word: JmdictWord) -> Option<BuildEntry> {
    let id: i64 = word.id.parse().ok()?;
    let kana = word.kana.first()?.text.clone();
    let common_writings = word
        .kanji
        .iter()
        .chain(word.kana.iter())
        .filter(|w| w.common)
        .count() as i64;

    let glosses: Vec<BuildGloss> = word
        .sense
        .iter()
        .enumerate()
        .flat_map(|(sense_index, sense)| {
            let pos = if sense.part_of_speech.is_empty() {
                None
            } else {
                Some(sense.part_of_speech.join(","))
            };
            sense
                .gloss
                .iter()
                .filter(|g| g.lang == "eng" && !g.text.trim().is_empty())
                .map(move |g| BuildGloss {
                    text: g.text.trim().to_string(),
                    part_of_speech: pos.clone(),
                    sense_index: sense_index as i64,
                })
        })
        .collect();
    if glosses.is_empty() {
        return None;
    }

    Some(BuildEntry {
        id,
        kanji: word.kanji.first().map(|k| k.text.clone()),
        kana,
        is_common: common_writings > 0,
        priority: common_writings,
        glosses,
    })
}

/// Insert one entry and its glosses. The FTS index is rebuilt separately.
pub async fn insert_entry(conn: &mut SqliteConnection, entry: &BuildEntry) -> Result<()> {
    sqlx::query("INSERT INTO entries (id, kanji, kana, is_common, priority) VALUES (?, ?, ?, ?, ?)")
        .bind(entry.id)
        .bind(&entry.kanji)
        .bind(&entry.kana)
        .bind(entry.is_common)
        .bind(entry.priority)
        .execute(&mut *conn)
        .await?;

    for gloss in &entry.glosses {
        sqlx::query(
            "INSERT INTO glosses (entry_id, gloss_text, gloss_normalized, part_of_speech, sense_index) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(&gloss.text)
        .bind(gloss.text.to_lowercase())
        .bind(&gloss.part_of_speech)
        .bind(gloss.sense_index)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Write a fresh dictionary database at `out` from rows.
pub async fn build_database(entries: &[BuildEntry], out: &Path, version: &str) -> Result<BuildSummary> {
    if out.exists() {
        std::fs::remove_file(out)
            .with_context(|| format!("Failed to replace existing database: {}", out.display()))?;
    }
    let pool = db::connect_for_build(out).await?;
    migrate::run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;
    let mut glosses = 0;
    for entry in entries {
        insert_entry(&mut tx, entry).await?;
        glosses += entry.glosses.len();
    }
    sqlx::query("INSERT OR REPLACE INTO bundle_info (key, value) VALUES ('version', ?)")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    migrate::rebuild_fulltext(&pool).await?;
    sqlx::query("VACUUM").execute(&pool).await?;
    pool.close().await;

    Ok(BuildSummary {
        entries: entries.len(),
        glosses,
    })
}

/// `lexi build`: import a jmdict-simplified JSON file.
pub async fn build_from_jmdict(json_path: &Path, out: &Path) -> Result<BuildSummary> {
    let file = File::open(json_path)
        .with_context(|| format!("Failed to open JMdict file: {}", json_path.display()))?;
    let parsed: JmdictFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JMdict JSON: {}", json_path.display()))?;

    let version = parsed.version.clone();
    let total = parsed.words.len();
    let entries: Vec<BuildEntry> = parsed.words.into_iter().filter_map(convert_word).collect();
    tracing::info!(
        words = total,
        kept = entries.len(),
        "converted jmdict-simplified words"
    );

    build_database(&entries, out, &version).await
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn gzip_file(src: &Path, dest: &Path) -> Result<()> {
    let mut input = BufReader::new(File::open(src)?);
    let output = BufWriter::new(File::create(dest)?);
    let mut encoder = GzEncoder::new(output, Compression::best());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// `lexi pack`: gzip the database and write `metadata.json` next to it.
pub async fn pack_bundle(db_path: &Path, out_dir: &Path, version: &str) -> Result<DictionaryMetadata> {
    if version.trim().is_empty() {
        anyhow::bail!("--version must not be empty");
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let filename = format!("dictionary-{}.sqlite.gz", version);
    let bundle_path: PathBuf = out_dir.join(&filename);
    let src = db_path.to_path_buf();
    let dest = bundle_path.clone();
    let sha256 = tokio::task::spawn_blocking(move || -> Result<String> {
        gzip_file(&src, &dest)?;
        sha256_file(&dest)
    })
    .await
    .context("gzip task panicked")??;

    let metadata = DictionaryMetadata {
        version: version.to_string(),
        filename,
        compressed_size: std::fs::metadata(&bundle_path)?.len(),
        uncompressed_size: std::fs::metadata(db_path)
            .with_context(|| format!("Failed to stat database: {}", db_path.display()))?
            .len(),
        source: "JMdict (jmdict-simplified)".to_string(),
        license: "CC-BY-SA 4.0".to_string(),
        updated_at: Utc::now(),
        sha256: Some(sha256),
    };
    let json = serde_json::to_string_pretty(&metadata)?;
    std::fs::write(out_dir.join("metadata.json"), json)?;

    tracing::info!(
        version = %metadata.version,
        compressed = metadata.compressed_size,
        "packed dictionary bundle"
    );
    Ok(metadata)
}
