//! Lookup engine: tiered forward search, override overlay, caching, and
//! reverse (Japanese → English) lookup.
//!
//! # Forward lookup
//!
//! 1. Validate and normalize the word.
//! 2. Overrides: a deletion returns `WordNotFound`; any other override is
//!    answered (and cached) without touching the cache or database.
//! 3. Cache hit → return.
//! 4. Tier 1 exact → tier 2 full-text (post-filtered on the gloss head) →
//!    tier 3 `LIKE` prefix, the last only when full-text is unavailable.
//! 5. Group by entry and summarize the best entry.
//!
//! # Initialization
//!
//! `idle → checking → copying → ready`, `error` on any failure. `copying`
//! is entered only when nothing is installed and a seed database is
//! configured. Concurrent first calls are serialized behind one async
//! mutex; once `ready`, calls are no-ops.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use lexibridge_core::cache::TtlCache;
use lexibridge_core::models::{
    EngineState, LookupEntry, ReverseEntry, TranslateResult, TranslationSource,
};
use lexibridge_core::overrides::{resolve, OverrideSource, OverrideVerdict};
use lexibridge_core::ranking::{
    filter_fulltext_hits, group_by_entry, group_reverse, summarize_forward, summarize_reverse,
};
use lexibridge_core::store::{DictionaryStore, GlossHit};
use lexibridge_core::text::{normalize_kana, normalize_query};
use lexibridge_core::LookupError;

use crate::config::LookupConfig;
use crate::db;
use crate::distribution::DistributionManager;
use crate::error::db_err;
use crate::sqlite_store::SqliteDictionaryStore;

/// Version recorded for a database adopted from the bundled seed.
pub const SEED_VERSION: &str = "seed";

/// A forward lookup answer with the grouped entries behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardLookup {
    pub result: TranslateResult,
    pub entries: Vec<LookupEntry>,
    pub from_cache: bool,
}

/// Where the engine gets its database from.
pub enum Backend {
    /// The installed dictionary, optionally seeded from a bundled copy.
    Installed {
        distribution: Arc<DistributionManager>,
        seed_db: Option<PathBuf>,
    },
    /// A ready-made store.
    Store(Arc<dyn DictionaryStore>),
}

pub struct LookupEngine {
    config: LookupConfig,
    backend: Backend,
    overrides: Arc<dyn OverrideSource>,
    state: RwLock<EngineState>,
    store: RwLock<Option<Arc<dyn DictionaryStore>>>,
    init_lock: Mutex<()>,
    cache: TtlCache<ForwardLookup>,
}

impl LookupEngine {
    pub fn new(config: LookupConfig, backend: Backend, overrides: Arc<dyn OverrideSource>) -> Self {
        let cache = TtlCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );
        Self {
            config,
            backend,
            overrides,
            state: RwLock::new(EngineState::Idle),
            store: RwLock::new(None),
            init_lock: Mutex::new(()),
            cache,
        }
    }

    pub fn status(&self) -> EngineState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "engine state");
            *state = next;
        }
    }

    fn current_store(&self) -> Option<Arc<dyn DictionaryStore>> {
        self.store.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Queries issued against the current store (0 before initialization).
    pub fn query_count(&self) -> u64 {
        self.current_store().map(|s| s.query_count()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop the open database and cached results; the next call re-initializes.
    /// Used after the installed file is replaced or deleted.
    pub async fn reset(&self) {
        let _guard = self.init_lock.lock().await;
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.cache.clear();
        self.set_state(EngineState::Idle);
    }

    pub async fn initialize(&self) -> Result<(), LookupError> {
        if self.status() == EngineState::Ready {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.status() == EngineState::Ready {
            return Ok(());
        }

        self.set_state(EngineState::Checking);
        match self.open_store().await {
            Ok(store) => {
                *self.store.write().unwrap_or_else(|e| e.into_inner()) = Some(store);
                self.set_state(EngineState::Ready);
                tracing::info!("lookup engine ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(EngineState::Error);
                tracing::error!(error = %e, "lookup engine initialization failed");
                Err(e)
            }
        }
    }

    async fn open_store(&self) -> Result<Arc<dyn DictionaryStore>, LookupError> {
        match &self.backend {
            Backend::Store(store) => {
                store.verify_schema().await?;
                Ok(store.clone())
            }
            Backend::Installed {
                distribution,
                seed_db,
            } => {
                if !distribution.is_installed().await {
                    match seed_db.as_ref().filter(|p| p.exists()) {
                        Some(seed) => {
                            self.set_state(EngineState::Copying);
                            tracing::info!(seed = %seed.display(), "installing bundled dictionary");
                            distribution.adopt_file(seed, SEED_VERSION).await?;
                        }
                        None => {
                            return Err(LookupError::Database(
                                "dictionary is not installed; run `lexi install`".to_string(),
                            ))
                        }
                    }
                }
                let pool = db::connect_read_only(&distribution.install_path())
                    .await
                    .map_err(db_err)?;
                let store = SqliteDictionaryStore::open(pool).await;
                store.verify_schema().await?;
                Ok(Arc::new(store))
            }
        }
    }

    async fn ready_store(&self) -> Result<Arc<dyn DictionaryStore>, LookupError> {
        self.initialize().await?;
        self.current_store()
            .ok_or_else(|| LookupError::Database("lookup engine is not initialized".to_string()))
    }

    /// Override outcome for `word` under the current snapshot.
    pub async fn override_verdict(&self, word: &str) -> OverrideVerdict {
        let overrides = self.overrides.current().await;
        resolve(overrides.as_ref(), &normalize_query(word))
    }

    /// English → Japanese lookup.
    pub async fn lookup(&self, word: &str) -> Result<ForwardLookup, LookupError> {
        let query = normalize_query(word);
        if query.is_empty() {
            return Err(LookupError::Validation("word must not be empty".to_string()));
        }

        match self.override_verdict(&query).await {
            OverrideVerdict::Deleted => {
                tracing::debug!(word = %query, "suppressed by deletion override");
                return Err(LookupError::not_found(query));
            }
            OverrideVerdict::Replaced(result) => {
                let answer = ForwardLookup {
                    result,
                    entries: Vec::new(),
                    from_cache: false,
                };
                self.cache.insert(query, answer.clone());
                return Ok(answer);
            }
            OverrideVerdict::PassThrough => {}
        }

        if let Some(mut hit) = self.cache.get(&query) {
            // The override behind this answer has since been withdrawn.
            if hit.result.source == TranslationSource::Override {
                self.cache.remove(&query);
            } else {
                tracing::debug!(word = %query, "lookup cache hit");
                hit.from_cache = true;
                return Ok(hit);
            }
        }

        let store = self.ready_store().await?;
        let hits = self.run_tiers(store.as_ref(), &query).await?;
        let entries = group_by_entry(hits);
        let result = summarize_forward(&entries).ok_or_else(|| LookupError::not_found(&query))?;

        let answer = ForwardLookup {
            result,
            entries,
            from_cache: false,
        };
        self.cache.insert(query, answer.clone());
        Ok(answer)
    }

    async fn run_tiers(
        &self,
        store: &dyn DictionaryStore,
        query: &str,
    ) -> Result<Vec<GlossHit>, LookupError> {
        let exact = store.exact_matches(query, self.config.exact_limit).await?;
        if !exact.is_empty() {
            return Ok(exact);
        }
        tracing::debug!(word = %query, "no exact match");

        if store.supports_fulltext() {
            match store.fulltext_matches(query, self.config.fts_candidates).await {
                Ok(candidates) => {
                    let total = candidates.len();
                    let kept = filter_fulltext_hits(candidates, query, self.config.fts_limit as usize);
                    tracing::debug!(word = %query, total, kept = kept.len(), "full-text tier");
                    return Ok(kept);
                }
                Err(e) => {
                    tracing::warn!(word = %query, error = %e, "full-text query failed; using prefix tier");
                }
            }
        }

        store.prefix_matches(query, self.config.exact_limit).await
    }

    /// Japanese → English lookup on kanji or normalized kana, exact only.
    pub async fn reverse_lookup(&self, text: &str) -> Result<Vec<ReverseEntry>, LookupError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(LookupError::Validation("text must not be empty".to_string()));
        }
        let kana = normalize_kana(raw);

        let store = self.ready_store().await?;
        let entries = group_reverse(store.reverse_matches(raw, &kana).await?);
        if entries.is_empty() {
            return Err(LookupError::not_found(raw));
        }
        Ok(entries)
    }

    /// Reverse lookup summarized as a single result.
    pub async fn translate_reverse(&self, text: &str) -> Result<TranslateResult, LookupError> {
        let entries = self.reverse_lookup(text).await?;
        summarize_reverse(&entries).ok_or_else(|| LookupError::not_found(text.trim()))
    }
}
