//! # lexibridge
//!
//! An offline-first English ⇄ Japanese dictionary engine.
//!
//! The JMdict-derived SQLite database ships as a versioned gzip bundle;
//! community corrections arrive separately as a small overrides file, and
//! anything the dictionary cannot answer can fall back to DeepL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  install   ┌──────────────┐
//! │ Distribution     │──────────▶│ dictionary    │
//! │ metadata/bundle  │            │ .sqlite       │
//! │ overrides (TTL)  │            └──────┬───────┘
//! └────────┬─────────┘                   │ read-only
//!          │ overrides                   ▼
//!          │              ┌─────────────────────────┐
//!          └─────────────▶│ Lookup engine            │
//!                         │ exact → FTS5 → prefix    │
//!                         └────────────┬────────────┘
//!                                      ▼
//!                         ┌─────────────────────────┐
//!                         │ Orchestrator             │──▶ DeepL
//!                         │ word/sentence, fallback  │
//!                         └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexi install                 # download and install the dictionary
//! lexi lookup run              # English → Japanese
//! lexi reverse 走る             # Japanese → English
//! lexi translate "I like cats" # falls back to DeepL for sentences
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`distribution`] | Bundle download, install, overrides cache |
//! | [`lookup`] | Tiered dictionary lookup |
//! | [`orchestrator`] | Word/sentence routing and translation fallback |
//! | [`deepl`] | DeepL HTTP client |
//! | [`sqlite_store`] | SQLite dictionary backend |
//! | [`builder`] | Build and pack dictionary bundles |
//! | [`db`] | Database connection |
//! | [`migrate`] | Dictionary schema |

pub mod app;
pub mod builder;
pub mod commands;
pub mod config;
pub mod db;
pub mod deepl;
pub mod distribution;
pub mod error;
pub mod kv_store;
pub mod logging;
pub mod lookup;
pub mod migrate;
pub mod orchestrator;
pub mod progress;
pub mod sqlite_store;
