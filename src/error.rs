//! Conversions from backend errors into the [`LookupError`] taxonomy.
//!
//! `LookupError` lives in the core crate, so these are plain functions
//! used with `map_err` rather than `From` impls.

use lexibridge_core::LookupError;

pub fn db_err(e: sqlx::Error) -> LookupError {
    LookupError::Database(e.to_string())
}

pub fn http_err(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout(e.to_string())
    } else {
        LookupError::Network(e.to_string())
    }
}

pub fn io_err(e: std::io::Error) -> LookupError {
    LookupError::Decompression(e.to_string())
}

/// Map a non-success HTTP status from the distribution endpoints.
pub fn status_err(status: reqwest::StatusCode, url: &str) -> LookupError {
    LookupError::Network(format!("GET {} failed (HTTP {})", url, status))
}
