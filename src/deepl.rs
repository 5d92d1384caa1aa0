//! DeepL translation client.
//!
//! Sends `POST {api_url}` as a form (`text`, `source_lang`, `target_lang`)
//! with an `Authorization: DeepL-Auth-Key <key>` header and reads the first
//! element of `translations`. No retries: the orchestrator decides what
//! happens after a failure.
//!
//! Status mapping: 403 → `AuthFailed`, 456 → `QuotaExceeded`,
//! 429 → `RateLimit`, anything else non-2xx → `Network`. Transport
//! timeouts become `Timeout`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use lexibridge_core::translator::{Translation, TranslationRequest, Translator};
use lexibridge_core::LookupError;

use crate::config::TranslatorConfig;
use crate::error::http_err;

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    #[serde(default)]
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
    #[serde(default)]
    detected_source_language: Option<String>,
}

pub struct DeepLTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl DeepLTranslator {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().build().map_err(http_err)?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }

    /// Build from `[translator]`, reading the key from the configured env var.
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, LookupError> {
        Self::new(
            config.api_url.clone(),
            config.api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> LookupError {
    match status.as_u16() {
        403 => LookupError::AuthFailed("DeepL rejected the API key".to_string()),
        456 => LookupError::QuotaExceeded,
        429 => LookupError::RateLimit,
        _ => LookupError::Network(format!("DeepL API error {}: {}", status, body.trim())),
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    fn name(&self) -> &str {
        "deepl"
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<Translation, LookupError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(LookupError::AuthFailed("credentials missing".to_string()));
        };

        let form = [
            ("text", request.text.as_str()),
            ("source_lang", request.source_lang.as_str()),
            ("target_lang", request.target_lang.as_str()),
        ];
        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .header("Authorization", format!("DeepL-Auth-Key {}", key))
            .form(&form)
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "DeepL request failed");
            return Err(status_error(status, &body));
        }

        let parsed: DeepLResponse = response.json().await.map_err(http_err)?;
        let first = parsed
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::Network("DeepL returned no translations".to_string()))?;
        Ok(Translation {
            text: first.text,
            detected_source_language: first.detected_source_language,
        })
    }
}
