use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the installed dictionary database inside `storage.data_dir`.
pub const INSTALL_FILE_NAME: &str = "dictionary.sqlite";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Bundled database copied into place on first use when nothing is installed.
    #[serde(default)]
    pub seed_db: Option<PathBuf>,
}

impl StorageConfig {
    pub fn install_path(&self) -> PathBuf {
        self.data_dir.join(INSTALL_FILE_NAME)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DistributionConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_overrides_ttl_secs")]
    pub overrides_ttl_secs: u64,
}

impl DistributionConfig {
    /// `{base_url}/{name}` without doubling the separator.
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_metadata_timeout_secs() -> u64 {
    15
}
fn default_overrides_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_exact_limit")]
    pub exact_limit: i64,
    #[serde(default = "default_fts_candidates")]
    pub fts_candidates: i64,
    #[serde(default = "default_fts_limit")]
    pub fts_limit: i64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            exact_limit: default_exact_limit(),
            fts_candidates: default_fts_candidates(),
            fts_limit: default_fts_limit(),
        }
    }
}

fn default_cache_capacity() -> usize {
    500
}
fn default_cache_ttl_secs() -> u64 {
    1800
}
fn default_exact_limit() -> i64 {
    20
}
fn default_fts_candidates() -> i64 {
    50
}
fn default_fts_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslatorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_url() -> String {
    "https://api-free.deepl.com/v2/translate".to_string()
}
fn default_api_key_env() -> String {
    "DEEPL_API_KEY".to_string()
}

impl TranslatorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.distribution.base_url.trim().is_empty() {
            anyhow::bail!("distribution.base_url must not be empty");
        }
        if !self.distribution.base_url.starts_with("http://")
            && !self.distribution.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "distribution.base_url must be an http(s) URL, got '{}'",
                self.distribution.base_url
            );
        }
        if self.distribution.timeout_secs == 0 || self.distribution.metadata_timeout_secs == 0 {
            anyhow::bail!("distribution timeouts must be > 0");
        }

        if self.lookup.cache_capacity == 0 {
            anyhow::bail!("lookup.cache_capacity must be > 0");
        }
        if self.lookup.exact_limit < 1 || self.lookup.fts_limit < 1 {
            anyhow::bail!("lookup.exact_limit and lookup.fts_limit must be >= 1");
        }
        if self.lookup.fts_candidates < self.lookup.fts_limit {
            anyhow::bail!("lookup.fts_candidates must be >= lookup.fts_limit");
        }

        match self.translator.provider.as_str() {
            "disabled" | "deepl" => {}
            other => anyhow::bail!(
                "Unknown translator provider: '{}'. Must be disabled or deepl.",
                other
            ),
        }
        if self.translator.timeout_secs == 0 {
            anyhow::bail!("translator.timeout_secs must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
