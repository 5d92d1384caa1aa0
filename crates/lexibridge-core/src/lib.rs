//! # lexibridge core
//!
//! Runtime-agnostic logic for lexibridge: dictionary data models, the error
//! taxonomy, the bounded TTL cache, override matching, text normalization,
//! lookup ranking, and the fallback decision table.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Storage,
//! durable state, and translation providers are reached through the
//! [`store::DictionaryStore`], [`kv::KeyValueStore`], and
//! [`translator::Translator`] traits so the native crate (or a test) can
//! plug in its own backends.

pub mod cache;
pub mod error;
pub mod kv;
pub mod models;
pub mod overrides;
pub mod policy;
pub mod ranking;
pub mod store;
pub mod text;
pub mod translator;

pub use error::{ErrorKind, LookupError};
pub use models::{Direction, TranslateResult, TranslationSource};
