//! Override matching and result synthesis.
//!
//! Overrides are keyed by lower-cased `word`. Scanning is top-to-bottom and
//! the first match wins, so publishers list later-approved patches first.
//! Deletions suppress a word; corrections and additions supply content.

use async_trait::async_trait;

use crate::models::{DictionaryOverride, OverrideType, OverridesFile, TranslateResult, TranslationSource};

/// Supplies the current override snapshot to the lookup engine.
///
/// Implementations must never fail: an unavailable snapshot is `None`.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    async fn current(&self) -> Option<OverridesFile>;
}

/// A fixed snapshot, for tests and for running without a distribution endpoint.
#[derive(Debug, Clone, Default)]
pub struct FixedOverrides(pub Option<OverridesFile>);

#[async_trait]
impl OverrideSource for FixedOverrides {
    async fn current(&self) -> Option<OverridesFile> {
        self.0.clone()
    }
}

fn same_word(candidate: &str, word: &str) -> bool {
    candidate.trim().to_lowercase() == word.trim().to_lowercase()
}

/// First non-deletion override whose word matches `word` case-insensitively.
pub fn find_override_for_word<'a>(
    overrides: &'a OverridesFile,
    word: &str,
) -> Option<&'a DictionaryOverride> {
    overrides
        .entries
        .iter()
        .filter(|o| o.override_type != OverrideType::Deletion)
        .find(|o| same_word(&o.word, word))
}

/// Whether a deletion override exists for `word`.
pub fn is_word_deleted(overrides: &OverridesFile, word: &str) -> bool {
    overrides
        .entries
        .iter()
        .filter(|o| o.override_type == OverrideType::Deletion)
        .any(|o| same_word(&o.word, word))
}

/// What the override layer decided for one word.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideVerdict {
    /// A deletion applies; the lookup must report not-found.
    Deleted,
    /// A correction/addition supplies the answer.
    Replaced(TranslateResult),
    /// No override; continue with cache and database.
    PassThrough,
}

/// Decide the override outcome for `word`. Deletions are checked first.
pub fn resolve(overrides: Option<&OverridesFile>, word: &str) -> OverrideVerdict {
    let Some(overrides) = overrides else {
        return OverrideVerdict::PassThrough;
    };
    if is_word_deleted(overrides, word) {
        return OverrideVerdict::Deleted;
    }
    match find_override_for_word(overrides, word).and_then(to_translate_result) {
        Some(result) => OverrideVerdict::Replaced(result),
        None => OverrideVerdict::PassThrough,
    }
}

/// Synthesize a result from an override; `None` when it carries no meaning.
pub fn to_translate_result(o: &DictionaryOverride) -> Option<TranslateResult> {
    let meaning = o.effective_meaning()?;
    Some(TranslateResult {
        text: meaning.to_string(),
        source: TranslationSource::Override,
        readings: o.reading.as_ref().map(|r| vec![r.clone()]),
        part_of_speech: o.part_of_speech.as_ref().map(|p| vec![p.clone()]),
        is_common: None,
        detected_language: None,
    })
}
