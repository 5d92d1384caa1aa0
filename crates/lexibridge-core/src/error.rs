//! Error taxonomy shared by every lexibridge component.
//!
//! Components never invent new categories: the orchestrator re-labels or
//! propagates whatever [`LookupError`] the underlying component produced.
//! [`ErrorKind`] is the fieldless projection used by the fallback decision
//! table in [`crate::policy`].

use serde::Serialize;

/// Fieldless error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    WordNotFound,
    AuthFailed,
    QuotaExceeded,
    RateLimit,
    Timeout,
    Network,
    Database,
    Decompression,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::WordNotFound => "word_not_found",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network_error",
            ErrorKind::Database => "database_error",
            ErrorKind::Decompression => "decompression_error",
        }
    }
}

/// Hint attached to a final `WordNotFound` when no translation key is set.
pub const CONFIGURE_TRANSLATOR_HINT: &str =
    "configure a translation API key for broader coverage";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no entry found for '{word}'{}", hint_suffix(.hint))]
    WordNotFound { word: String, hint: Option<String> },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("translation quota exceeded")]
    QuotaExceeded,

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("decompression failed: {0}")]
    Decompression(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" ({})", h),
        None => String::new(),
    }
}

impl LookupError {
    pub fn not_found(word: impl Into<String>) -> Self {
        LookupError::WordNotFound {
            word: word.into(),
            hint: None,
        }
    }

    /// Attach an actionable hint to a `WordNotFound`; other variants pass through.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            LookupError::WordNotFound { word, .. } => LookupError::WordNotFound {
                word,
                hint: Some(hint.into()),
            },
            other => other,
        }
    }

    /// Append `hint` to the message of any message-carrying variant, keeping
    /// its kind. `WordNotFound` gets it as its hint field.
    pub fn with_context_hint(self, hint: &str) -> Self {
        let append = |msg: String| format!("{}; {}", msg, hint);
        match self {
            LookupError::WordNotFound { .. } => self.with_hint(hint),
            LookupError::Validation(m) => LookupError::Validation(append(m)),
            LookupError::AuthFailed(m) => LookupError::AuthFailed(append(m)),
            LookupError::Timeout(m) => LookupError::Timeout(append(m)),
            LookupError::Network(m) => LookupError::Network(append(m)),
            LookupError::Database(m) => LookupError::Database(append(m)),
            LookupError::Decompression(m) => LookupError::Decompression(append(m)),
            LookupError::QuotaExceeded | LookupError::RateLimit => self,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::Validation(_) => ErrorKind::Validation,
            LookupError::WordNotFound { .. } => ErrorKind::WordNotFound,
            LookupError::AuthFailed(_) => ErrorKind::AuthFailed,
            LookupError::QuotaExceeded => ErrorKind::QuotaExceeded,
            LookupError::RateLimit => ErrorKind::RateLimit,
            LookupError::Timeout(_) => ErrorKind::Timeout,
            LookupError::Network(_) => ErrorKind::Network,
            LookupError::Database(_) => ErrorKind::Database,
            LookupError::Decompression(_) => ErrorKind::Decompression,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::WordNotFound
    }
}
