//! Core data models used throughout lexibridge.
//!
//! These types represent the distribution descriptors, dictionary rows,
//! community overrides, and translation results that flow between the
//! distribution manager, the lookup engine, and the orchestrator.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Distribution ============

/// Descriptor served at `{base}/metadata.json`. Immutable per version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryMetadata {
    pub version: String,
    /// Name of the gzip bundle, relative to the distribution base URL.
    pub filename: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub source: String,
    pub license: String,
    pub updated_at: DateTime<Utc>,
    /// Hex SHA-256 of the compressed bundle, when the publisher provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Persisted install record. Never `installed = true` without the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallState {
    pub installed: bool,
    pub installed_version: Option<String>,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCheck {
    pub available: bool,
    pub current: Option<String>,
    pub latest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub percentage: f64,
}

impl DownloadProgress {
    pub fn new(downloaded_bytes: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            0.0
        } else {
            (downloaded_bytes as f64 / total_bytes as f64 * 100.0).min(100.0)
        };
        Self {
            total_bytes,
            downloaded_bytes,
            percentage,
        }
    }
}

/// Install pipeline state.
///
/// ```text
/// not_installed → checking → downloading → extracting → installing → installed
///                     └──────────┴────────────┴────────────┴──→ error
/// installed → update_available (drift detected) → checking …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    NotInstalled,
    Checking,
    Downloading,
    Extracting,
    Installing,
    Installed,
    UpdateAvailable,
    Error,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStatus::NotInstalled => "not_installed",
            InstallStatus::Checking => "checking",
            InstallStatus::Downloading => "downloading",
            InstallStatus::Extracting => "extracting",
            InstallStatus::Installing => "installing",
            InstallStatus::Installed => "installed",
            InstallStatus::UpdateAvailable => "update_available",
            InstallStatus::Error => "error",
        }
    }

    /// Whether `self → next` is a legal transition. No stage is ever skipped.
    pub fn can_transition_to(&self, next: InstallStatus) -> bool {
        use InstallStatus::*;
        match (self, next) {
            (NotInstalled | Installed | UpdateAvailable | Error, Checking) => true,
            (Checking, Downloading) => true,
            (Downloading, Extracting) => true,
            (Extracting, Installing) => true,
            (Installing, Installed) => true,
            (Installed, UpdateAvailable) => true,
            (Installed | UpdateAvailable | Error, NotInstalled) => true,
            (Checking | Downloading | Extracting | Installing, Error) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallStatus::Installed | InstallStatus::Error)
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Dictionary rows ============

/// One headword row. `kanji` is absent for kana-only words.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DictionaryEntry {
    pub id: i64,
    pub kanji: Option<String>,
    pub kana: String,
    pub is_common: bool,
    pub priority: i64,
}

impl DictionaryEntry {
    /// Kanji spelling when present, otherwise the kana.
    pub fn headword(&self) -> &str {
        self.kanji.as_deref().unwrap_or(&self.kana)
    }
}

/// One sense of an entry. `sense_index` ascending means primary meaning first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gloss {
    pub id: i64,
    pub entry_id: i64,
    pub gloss_text: String,
    /// Lower-cased `gloss_text`, used for matching.
    pub gloss_normalized: String,
    pub part_of_speech: Option<String>,
    pub sense_index: i64,
}

/// A forward lookup result: one entry and its matched glosses in query order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupEntry {
    pub entry: DictionaryEntry,
    pub glosses: Vec<Gloss>,
}

/// A reverse (Japanese → English) result with deduplicated meanings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReverseEntry {
    pub entry_id: i64,
    pub kanji: Option<String>,
    pub kana: String,
    pub is_common: bool,
    pub meanings: Vec<String>,
    pub parts_of_speech: Vec<String>,
}

// ============ Overrides ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideType {
    Correction,
    Addition,
    Deletion,
}

/// A community-approved patch applied on top of the installed database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryOverride {
    pub id: i64,
    #[serde(rename = "type")]
    pub override_type: OverrideType,
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub source_issue: i64,
    pub approved_at: DateTime<Utc>,
}

impl DictionaryOverride {
    /// The text this override supplies: corrected meaning first, then meaning.
    pub fn effective_meaning(&self) -> Option<&str> {
        self.corrected_meaning
            .as_deref()
            .or(self.meaning.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

/// The whole `overrides.json` snapshot. Never merged piecemeal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverridesFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<DictionaryOverride>,
}

impl OverridesFile {
    /// The "no overrides yet" snapshot (served as 404 upstream).
    pub fn empty() -> Self {
        Self {
            version: String::new(),
            updated_at: DateTime::<Utc>::default(),
            entries: Vec::new(),
        }
    }
}

// ============ Translation ============

/// Which source produced a [`TranslateResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationSource {
    Jmdict,
    Override,
    Deepl,
    None,
}

impl TranslationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationSource::Jmdict => "jmdict",
            TranslationSource::Override => "override",
            TranslationSource::Deepl => "deepl",
            TranslationSource::None => "none",
        }
    }
}

impl fmt::Display for TranslationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateResult {
    pub text: String,
    pub source: TranslationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_common: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
}

impl TranslateResult {
    pub fn plain(text: impl Into<String>, source: TranslationSource) -> Self {
        Self {
            text: text.into(),
            source,
            readings: None,
            part_of_speech: None,
            is_common: None,
            detected_language: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    #[serde(rename = "en-ja")]
    EnToJa,
    #[serde(rename = "ja-en")]
    JaToEn,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::EnToJa => "en-ja",
            Direction::JaToEn => "ja-en",
        }
    }

    /// Upper-case source language code for translation APIs.
    pub fn source_lang(&self) -> &'static str {
        match self {
            Direction::EnToJa => "EN",
            Direction::JaToEn => "JA",
        }
    }

    /// Upper-case target language code for translation APIs.
    pub fn target_lang(&self) -> &'static str {
        match self {
            Direction::EnToJa => "JA",
            Direction::JaToEn => "EN",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en-ja" | "en2ja" | "en" => Ok(Direction::EnToJa),
            "ja-en" | "ja2en" | "ja" => Ok(Direction::JaToEn),
            other => Err(format!(
                "Unknown direction: '{}'. Use en-ja or ja-en.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Word,
    Sentence,
}

/// Orchestrator output: the result plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedTranslateResult {
    #[serde(flatten)]
    pub result: TranslateResult,
    pub direction: Direction,
    pub input_kind: InputKind,
    pub from_cache: bool,
    pub dictionary_attempted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<LookupEntry>,
}

/// Lookup engine initialization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Checking,
    Copying,
    Ready,
    Error,
}
