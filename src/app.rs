//! Wiring of the three services from a [`Config`].
//!
//! [`Lexibridge`] owns one `Arc` of each service and keeps their caches
//! consistent: after an install or delete the lookup engine is reset, and
//! after an override refresh every result cache is dropped.

use std::sync::Arc;

use anyhow::{Context, Result};

use lexibridge_core::kv::KeyValueStore;
use lexibridge_core::models::{
    DictionaryMetadata, EngineState, ExtendedTranslateResult, InstallState, InstallStatus,
    OverridesFile, ReverseEntry, UpdateCheck,
};
use lexibridge_core::translator::{DisabledTranslator, Translator};
use lexibridge_core::LookupError;

use crate::config::Config;
use crate::deepl::DeepLTranslator;
use crate::distribution::DistributionManager;
use crate::kv_store::FileKvStore;
use crate::lookup::{Backend, ForwardLookup, LookupEngine};
use crate::orchestrator::{Orchestrator, TranslateOptions};
use crate::progress::EventSender;

pub struct Lexibridge {
    distribution: Arc<DistributionManager>,
    engine: Arc<LookupEngine>,
    orchestrator: Orchestrator,
}

/// The translator selected by `[translator] provider`.
pub fn translator_from_config(config: &Config) -> Result<Arc<dyn Translator>> {
    if !config.translator.is_enabled() {
        return Ok(Arc::new(DisabledTranslator));
    }
    let deepl = DeepLTranslator::from_config(&config.translator)
        .context("Failed to create DeepL client")?;
    if !deepl.has_credential() {
        tracing::warn!(
            env = %config.translator.api_key_env,
            "translator enabled but no API key is set"
        );
    }
    Ok(Arc::new(deepl))
}

impl Lexibridge {
    /// Open the file-backed state and build every service.
    pub async fn open(config: &Config) -> Result<Self> {
        let kv = FileKvStore::open(config.storage.state_path()).await?;
        let translator = translator_from_config(config)?;
        Self::with_parts(config, Arc::new(kv), translator)
    }

    /// Build with explicit state and translator backends.
    pub fn with_parts(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        translator: Arc<dyn Translator>,
    ) -> Result<Self> {
        let distribution = Arc::new(
            DistributionManager::new(config.storage.clone(), config.distribution.clone(), kv)
                .context("Failed to create distribution client")?,
        );
        let engine = Arc::new(LookupEngine::new(
            config.lookup.clone(),
            Backend::Installed {
                distribution: distribution.clone(),
                seed_db: config.storage.seed_db.clone(),
            },
            distribution.clone(),
        ));
        let orchestrator = Orchestrator::new(engine.clone(), translator, &config.lookup);
        Ok(Self {
            distribution,
            engine,
            orchestrator,
        })
    }

    pub fn distribution(&self) -> &Arc<DistributionManager> {
        &self.distribution
    }

    pub fn engine(&self) -> &Arc<LookupEngine> {
        &self.engine
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    // ============ Distribution ============

    pub async fn install(&self, events: Option<&EventSender>) -> Result<DictionaryMetadata, LookupError> {
        let metadata = self.distribution.install_dictionary(events).await?;
        self.invalidate().await;
        Ok(metadata)
    }

    pub async fn delete(&self) -> Result<(), LookupError> {
        self.distribution.delete_dictionary().await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn install_state(&self) -> InstallState {
        self.distribution.install_state().await
    }

    pub async fn install_status(&self) -> InstallStatus {
        self.distribution.status().await
    }

    pub async fn check_for_update(&self) -> Result<UpdateCheck, LookupError> {
        self.distribution.check_for_update().await
    }

    pub async fn overrides(&self) -> Option<OverridesFile> {
        self.distribution.get_overrides().await
    }

    pub async fn refresh_overrides(&self) -> Result<OverridesFile, LookupError> {
        let file = self.distribution.refresh_overrides().await?;
        self.engine.clear_cache();
        self.orchestrator.clear_cache();
        Ok(file)
    }

    async fn invalidate(&self) {
        self.engine.reset().await;
        self.orchestrator.clear_cache();
    }

    // ============ Lookup ============

    pub fn engine_state(&self) -> EngineState {
        self.engine.status()
    }

    pub async fn lookup(&self, word: &str) -> Result<ForwardLookup, LookupError> {
        self.engine.lookup(word).await
    }

    pub async fn reverse(&self, text: &str) -> Result<Vec<ReverseEntry>, LookupError> {
        self.engine.reverse_lookup(text).await
    }

    pub async fn translate(
        &self,
        text: &str,
        options: TranslateOptions,
    ) -> Result<ExtendedTranslateResult, LookupError> {
        self.orchestrator.translate(text, options).await
    }
}
