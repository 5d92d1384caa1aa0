//! External translation provider seam.
//!
//! The orchestrator only sees [`Translator`]. The DeepL client lives in the
//! native crate; [`DisabledTranslator`] stands in when no provider is
//! configured and reports no credential, which steers the decision table
//! towards the appropriate "missing credential" outcome.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LookupError;
use crate::models::Direction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationRequest {
    pub text: String,
    /// Upper-case language code, e.g. `EN`.
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, direction: Direction) -> Self {
        Self {
            text: text.into(),
            source_lang: direction.source_lang().to_string(),
            target_lang: direction.target_lang().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub text: String,
    pub detected_source_language: Option<String>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a credential is configured; without one the provider is never called.
    fn has_credential(&self) -> bool;

    async fn translate(&self, request: &TranslationRequest) -> Result<Translation, LookupError>;
}

/// Placeholder provider used when translation is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTranslator;

#[async_trait]
impl Translator for DisabledTranslator {
    fn name(&self) -> &str {
        "disabled"
    }

    fn has_credential(&self) -> bool {
        false
    }

    async fn translate(&self, _request: &TranslationRequest) -> Result<Translation, LookupError> {
        Err(LookupError::AuthFailed("credentials missing".to_string()))
    }
}
