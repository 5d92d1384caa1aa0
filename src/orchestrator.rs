//! Fallback translation orchestrator.
//!
//! Classifies the input (word vs sentence), resolves the direction, then
//! drives [`lexibridge_core::policy::decide`] until it returns a terminal
//! action. Successful results from any source are cached under
//! `"{direction}:{normalized text}"`. English words are checked against the
//! current override snapshot before the cache is read, so a cached answer
//! never outlives a deletion or correction.

use std::sync::Arc;
use std::time::Duration;

use lexibridge_core::cache::TtlCache;
use lexibridge_core::error::CONFIGURE_TRANSLATOR_HINT;
use lexibridge_core::models::{Direction, ExtendedTranslateResult, InputKind, LookupEntry};
use lexibridge_core::overrides::OverrideVerdict;
use lexibridge_core::policy::{decide, Failure, NextAction, PolicyInput, Step};
use lexibridge_core::text::{classify_input, detect_direction, normalize_query};
use lexibridge_core::translator::{TranslationRequest, Translator};
use lexibridge_core::{LookupError, TranslateResult, TranslationSource};

use crate::config::LookupConfig;
use crate::lookup::LookupEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOptions {
    /// `None` auto-detects from the script of the input.
    pub direction: Option<Direction>,
    pub prefer_dictionary: bool,
    pub allow_fallback: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            direction: None,
            prefer_dictionary: true,
            allow_fallback: true,
        }
    }
}

pub struct Orchestrator {
    engine: Arc<LookupEngine>,
    translator: Arc<dyn Translator>,
    cache: TtlCache<ExtendedTranslateResult>,
}

impl Orchestrator {
    pub fn new(engine: Arc<LookupEngine>, translator: Arc<dyn Translator>, config: &LookupConfig) -> Self {
        Self {
            engine,
            translator,
            cache: TtlCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
        }
    }

    pub fn engine(&self) -> &Arc<LookupEngine> {
        &self.engine
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub async fn translate(
        &self,
        text: &str,
        options: TranslateOptions,
    ) -> Result<ExtendedTranslateResult, LookupError> {
        let input = text.trim();
        if input.is_empty() {
            return Err(LookupError::Validation("text must not be empty".to_string()));
        }

        let direction = options.direction.unwrap_or_else(|| detect_direction(input));
        let kind = classify_input(input);
        let key = format!("{}:{}", direction.as_str(), normalize_query(input));

        let verdict = if direction == Direction::EnToJa && kind == InputKind::Word {
            self.engine.override_verdict(input).await
        } else {
            OverrideVerdict::PassThrough
        };

        if let Some(mut hit) = self.cache.get(&key) {
            if agrees_with(&hit.result, &verdict) {
                tracing::debug!(%key, "translation cache hit");
                hit.from_cache = true;
                return Ok(hit);
            }
            tracing::debug!(%key, "cached translation superseded by overrides");
            self.cache.remove(&key);
        }

        let mut step = Step::Start;
        let mut last_error: Option<LookupError> = None;
        let mut dictionary_attempted = false;

        loop {
            let action = decide(&PolicyInput {
                kind,
                prefer_dictionary: options.prefer_dictionary,
                allow_fallback: options.allow_fallback,
                step,
                has_credential: self.translator.has_credential(),
            });
            tracing::debug!(?step, ?action, "translation policy");

            let attempt = match action {
                NextAction::TryDictionary => {
                    dictionary_attempted = true;
                    match self.from_dictionary(input, direction).await {
                        Ok(found) => Ok(found),
                        Err(e) => {
                            step = Step::DictionaryFailed(e.kind());
                            Err(e)
                        }
                    }
                }
                NextAction::TryExternal => match self.from_translator(input, direction).await {
                    Ok(result) => Ok((result, Vec::new())),
                    Err(e) => {
                        step = Step::ExternalFailed(e.kind());
                        Err(e)
                    }
                },
                NextAction::Return(failure) => {
                    return Err(failure_error(failure, last_error.take(), input));
                }
            };

            match attempt {
                Ok((result, entries)) => {
                    let answer = ExtendedTranslateResult {
                        result,
                        direction,
                        input_kind: kind,
                        from_cache: false,
                        dictionary_attempted,
                        entries,
                    };
                    self.cache.insert(key, answer.clone());
                    return Ok(answer);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "translation source failed");
                    last_error = Some(e);
                }
            }
        }
    }

    async fn from_dictionary(
        &self,
        input: &str,
        direction: Direction,
    ) -> Result<(TranslateResult, Vec<LookupEntry>), LookupError> {
        match direction {
            Direction::EnToJa => {
                let found = self.engine.lookup(input).await?;
                Ok((found.result, found.entries))
            }
            Direction::JaToEn => Ok((self.engine.translate_reverse(input).await?, Vec::new())),
        }
    }

    async fn from_translator(
        &self,
        input: &str,
        direction: Direction,
    ) -> Result<TranslateResult, LookupError> {
        let request = TranslationRequest::new(input, direction);
        let translation = self.translator.translate(&request).await?;
        tracing::info!(provider = self.translator.name(), "translated via external provider");
        let mut result = TranslateResult::plain(translation.text, TranslationSource::Deepl);
        result.detected_language = translation
            .detected_source_language
            .map(|l| l.to_lowercase());
        Ok(result)
    }
}

/// Whether a cached answer is still what the current overrides would produce.
fn agrees_with(cached: &TranslateResult, verdict: &OverrideVerdict) -> bool {
    match verdict {
        OverrideVerdict::PassThrough => cached.source != TranslationSource::Override,
        // A deleted word can only be answered by the external translator.
        OverrideVerdict::Deleted => cached.source == TranslationSource::Deepl,
        OverrideVerdict::Replaced(result) => cached == result,
    }
}

fn failure_error(failure: Failure, last: Option<LookupError>, input: &str) -> LookupError {
    match failure {
        Failure::Propagate => last.unwrap_or_else(|| LookupError::not_found(input)),
        Failure::NotFoundWithHint => LookupError::not_found(input).with_hint(CONFIGURE_TRANSLATOR_HINT),
        Failure::PropagateWithHint => last
            .unwrap_or_else(|| LookupError::not_found(input))
            .with_context_hint(CONFIGURE_TRANSLATOR_HINT),
        Failure::CredentialsMissing => LookupError::AuthFailed("credentials missing".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Backend;
    use async_trait::async_trait;
    use chrono::Utc;
    use lexibridge_core::models::{DictionaryEntry, DictionaryOverride, OverrideType, OverridesFile};
    use lexibridge_core::overrides::{FixedOverrides, OverrideSource};
    use lexibridge_core::store::memory::InMemoryDictionaryStore;
    use lexibridge_core::store::{DictionaryStore, GlossHit};
    use lexibridge_core::translator::{DisabledTranslator, Translation};
    use lexibridge_core::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedTranslator {
        reply: Result<String, LookupError>,
        calls: AtomicUsize,
        seen: Mutex<Vec<TranslationRequest>>,
    }

    impl ScriptedTranslator {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: LookupError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Translator for ScriptedTranslator {
        fn name(&self) -> &str {
            "scripted"
        }

        fn has_credential(&self) -> bool {
            true
        }

        async fn translate(&self, request: &TranslationRequest) -> Result<Translation, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone().map(|text| Translation {
                text,
                detected_source_language: Some("EN".to_string()),
            })
        }
    }

    fn store() -> Arc<InMemoryDictionaryStore> {
        let store = InMemoryDictionaryStore::new();
        store.insert_entry(
            DictionaryEntry {
                id: 1,
                kanji: Some("猫".into()),
                kana: "ねこ".into(),
                is_common: true,
                priority: 5,
            },
            &[("cat", Some("n"))],
        );
        Arc::new(store)
    }

    fn orchestrator(
        store: Arc<InMemoryDictionaryStore>,
        translator: Arc<dyn Translator>,
    ) -> Orchestrator {
        orchestrator_with(store, translator, Arc::new(FixedOverrides(None)))
    }

    fn orchestrator_with(
        store: Arc<InMemoryDictionaryStore>,
        translator: Arc<dyn Translator>,
        overrides: Arc<dyn OverrideSource>,
    ) -> Orchestrator {
        let config = LookupConfig::default();
        let engine = Arc::new(LookupEngine::new(config.clone(), Backend::Store(store), overrides));
        Orchestrator::new(engine, translator, &config)
    }

    #[derive(Default)]
    struct SwappableOverrides(Mutex<Option<OverridesFile>>);

    impl SwappableOverrides {
        fn set(&self, override_type: OverrideType, word: &str, meaning: Option<&str>) {
            *self.0.lock().unwrap() = Some(OverridesFile {
                version: "2".to_string(),
                updated_at: Utc::now(),
                entries: vec![DictionaryOverride {
                    id: 1,
                    override_type,
                    word: word.to_string(),
                    original_meaning: None,
                    corrected_meaning: meaning.map(str::to_string),
                    meaning: None,
                    reading: None,
                    part_of_speech: None,
                    source_issue: 10,
                    approved_at: Utc::now(),
                }],
            });
        }

        fn clear(&self) {
            *self.0.lock().unwrap() = None;
        }
    }

    #[async_trait]
    impl OverrideSource for SwappableOverrides {
        async fn current(&self) -> Option<OverridesFile> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn dictionary_answers_words_first() {
        let translator = ScriptedTranslator::ok("unused");
        let orch = orchestrator(store(), translator.clone());
        let out = orch.translate("cat", TranslateOptions::default()).await.unwrap();
        assert_eq!(out.result.text, "猫");
        assert_eq!(out.result.source, TranslationSource::Jmdict);
        assert_eq!(out.direction, Direction::EnToJa);
        assert!(out.dictionary_attempted);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_word_falls_back_to_translator() {
        let translator = ScriptedTranslator::ok("走る");
        let orch = orchestrator(store(), translator.clone());
        let out = orch.translate("run", TranslateOptions::default()).await.unwrap();
        assert_eq!(out.result.text, "走る");
        assert_eq!(out.result.source, TranslationSource::Deepl);
        assert_eq!(out.result.detected_language.as_deref(), Some("en"));
        assert!(out.dictionary_attempted);
        let seen = translator.seen.lock().unwrap();
        assert_eq!(seen[0].source_lang, "EN");
        assert_eq!(seen[0].target_lang, "JA");
    }

    #[tokio::test]
    async fn sentences_skip_the_dictionary() {
        let store = store();
        let translator = ScriptedTranslator::ok("猫が好きです");
        let orch = orchestrator(store.clone(), translator.clone());
        let out = orch
            .translate("I like cats a lot", TranslateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.input_kind, InputKind::Sentence);
        assert!(!out.dictionary_attempted);
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn no_credential_after_dictionary_miss_gives_hint() {
        let orch = orchestrator(store(), Arc::new(DisabledTranslator));
        let err = orch.translate("zebra", TranslateOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WordNotFound);
        assert!(err.to_string().contains(CONFIGURE_TRANSLATOR_HINT));
    }

    #[tokio::test]
    async fn no_credential_for_sentence_is_auth_failure() {
        let orch = orchestrator(store(), Arc::new(DisabledTranslator));
        let err = orch
            .translate("where is the station", TranslateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, LookupError::AuthFailed("credentials missing".to_string()));
    }

    #[tokio::test]
    async fn fallback_disabled_propagates_not_found() {
        let translator = ScriptedTranslator::ok("unused");
        let orch = orchestrator(store(), translator.clone());
        let options = TranslateOptions {
            allow_fallback: false,
            ..TranslateOptions::default()
        };
        let err = orch.translate("zebra", options).await.unwrap_err();
        assert_eq!(err, LookupError::not_found("zebra"));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn external_error_kind_is_preserved() {
        let translator = ScriptedTranslator::failing(LookupError::QuotaExceeded);
        let orch = orchestrator(store(), translator);
        let err = orch.translate("zebra", TranslateOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn japanese_input_uses_reverse_lookup() {
        let orch = orchestrator(store(), ScriptedTranslator::ok("unused"));
        let out = orch.translate("ネコ", TranslateOptions::default()).await.unwrap();
        assert_eq!(out.direction, Direction::JaToEn);
        assert_eq!(out.result.text, "cat");
    }

    #[tokio::test]
    async fn repeated_translation_is_cached() {
        let translator = ScriptedTranslator::ok("走る");
        let orch = orchestrator(store(), translator.clone());
        orch.translate("run", TranslateOptions::default()).await.unwrap();
        let again = orch.translate("  RUN ", TranslateOptions::default()).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

        orch.clear_cache();
        orch.translate("run", TranslateOptions::default()).await.unwrap();
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn new_deletion_beats_cached_translation() {
        let overrides = Arc::new(SwappableOverrides::default());
        let orch = orchestrator_with(store(), Arc::new(DisabledTranslator), overrides.clone());

        let first = orch.translate("cat", TranslateOptions::default()).await.unwrap();
        assert_eq!(first.result.source, TranslationSource::Jmdict);

        overrides.set(OverrideType::Deletion, "cat", None);
        let err = orch.translate("cat", TranslateOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WordNotFound);
    }

    #[tokio::test]
    async fn cached_translation_tracks_corrections() {
        let overrides = Arc::new(SwappableOverrides::default());
        let orch = orchestrator_with(store(), ScriptedTranslator::ok("unused"), overrides.clone());
        orch.translate("cat", TranslateOptions::default()).await.unwrap();

        overrides.set(OverrideType::Correction, "cat", Some("ネコ科"));
        let corrected = orch.translate("cat", TranslateOptions::default()).await.unwrap();
        assert_eq!(corrected.result.text, "ネコ科");
        assert_eq!(corrected.result.source, TranslationSource::Override);
        assert!(!corrected.from_cache);

        let again = orch.translate("cat", TranslateOptions::default()).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(again.result.text, "ネコ科");

        overrides.clear();
        let restored = orch.translate("cat", TranslateOptions::default()).await.unwrap();
        assert_eq!(restored.result.text, "猫");
        assert_eq!(restored.result.source, TranslationSource::Jmdict);
    }

    /// A store whose schema check always fails.
    struct BrokenStore;

    #[async_trait]
    impl DictionaryStore for BrokenStore {
        fn supports_fulltext(&self) -> bool {
            false
        }

        async fn verify_schema(&self) -> Result<(), LookupError> {
            Err(LookupError::Database("no such table: glosses".to_string()))
        }

        async fn exact_matches(&self, _: &str, _: i64) -> Result<Vec<GlossHit>, LookupError> {
            Ok(Vec::new())
        }

        async fn fulltext_matches(&self, _: &str, _: i64) -> Result<Vec<GlossHit>, LookupError> {
            Ok(Vec::new())
        }

        async fn prefix_matches(&self, _: &str, _: i64) -> Result<Vec<GlossHit>, LookupError> {
            Ok(Vec::new())
        }

        async fn reverse_matches(&self, _: &str, _: &str) -> Result<Vec<GlossHit>, LookupError> {
            Ok(Vec::new())
        }

        fn query_count(&self) -> u64 {
            0
        }
    }

    #[tokio::test]
    async fn database_failure_without_credential_carries_hint() {
        let config = LookupConfig::default();
        let engine = Arc::new(LookupEngine::new(
            config.clone(),
            Backend::Store(Arc::new(BrokenStore)),
            Arc::new(FixedOverrides(None)),
        ));
        let orch = Orchestrator::new(engine, Arc::new(DisabledTranslator), &config);

        let err = orch.translate("cat", TranslateOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(err.to_string().contains("no such table"));
        assert!(err.to_string().contains(CONFIGURE_TRANSLATOR_HINT));
    }
}
