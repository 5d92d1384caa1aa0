//! Dictionary distribution: metadata, resumable download, verified install,
//! and the overrides diff.
//!
//! # Install pipeline
//!
//! ```text
//! not_installed → checking → downloading → extracting → installing → installed
//!                     └──────────┴────────────┴────────────┴──→ error
//! ```
//!
//! - **checking**: `GET {base}/metadata.json`.
//! - **downloading**: `GET {base}/{filename}` into `<data_dir>/downloads/`.
//!   A partial file is resumed with `Range: bytes=N-` only when it belongs
//!   to the same bundle version; any other leftover is deleted first.
//! - **extracting**: gzip → `<install>.partial`, SQLite header check.
//! - **installing**: atomic rename over the installed file, then the
//!   `installed` flag and version are persisted. The flag is never written
//!   before the rename succeeds.
//!
//! Every transition is sent as [`InstallEvent::Status`]; download progress
//! as [`InstallEvent::Download`].
//!
//! # Overrides
//!
//! [`DistributionManager::get_overrides`] reads through three tiers:
//! memory (TTL) → durable key-value store (TTL) → `GET {base}/overrides.json`.
//! Remote failures degrade to the last cached snapshot, however stale, or
//! `None`, and suppress further fetches for [`OVERRIDES_RETRY_AFTER`] so an
//! offline lookup never waits on the network twice in a row. A 404 means
//! "no overrides yet" and yields an empty snapshot.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use lexibridge_core::cache::TtlCache;
use lexibridge_core::kv::{
    KeyValueStore, KEY_INSTALLED, KEY_OVERRIDES, KEY_OVERRIDES_FETCHED_AT, KEY_VERSION,
};
use lexibridge_core::models::{
    DictionaryMetadata, DownloadProgress, InstallState, InstallStatus, OverridesFile, UpdateCheck,
};
use lexibridge_core::overrides::OverrideSource;
use lexibridge_core::LookupError;

use crate::config::{DistributionConfig, StorageConfig};
use crate::error::{http_err, io_err, status_err};
use crate::progress::{EventSender, InstallEvent};

/// Version of the bundle a leftover partial download belongs to.
const KEY_PARTIAL_VERSION: &str = "download.partial_version";
const OVERRIDES_MEMORY_KEY: &str = "overrides";
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
/// Quiet period after a failed `overrides.json` fetch.
pub const OVERRIDES_RETRY_AFTER: Duration = Duration::from_secs(60);

async fn emit(events: Option<&EventSender>, event: InstallEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching.
        let _ = tx.send(event).await;
    }
}

fn write_err(path: &Path, e: std::io::Error) -> LookupError {
    LookupError::Network(format!("failed to write {}: {}", path.display(), e))
}

/// Owns the install location, the durable state, and the override caches.
pub struct DistributionManager {
    storage: StorageConfig,
    distribution: DistributionConfig,
    client: reqwest::Client,
    kv: Arc<dyn KeyValueStore>,
    overrides: TtlCache<OverridesFile>,
    overrides_ttl: Duration,
    install_lock: Mutex<()>,
    override_fetches: AtomicU64,
    overrides_retry_at: StdMutex<Option<Instant>>,
}

impl DistributionManager {
    pub fn new(
        storage: StorageConfig,
        distribution: DistributionConfig,
        kv: Arc<dyn KeyValueStore>,
    ) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(distribution.timeout_secs))
            .build()
            .map_err(http_err)?;
        let overrides_ttl = Duration::from_secs(distribution.overrides_ttl_secs);
        Ok(Self {
            storage,
            distribution,
            client,
            kv,
            overrides: TtlCache::new(1, overrides_ttl),
            overrides_ttl,
            install_lock: Mutex::new(()),
            override_fetches: AtomicU64::new(0),
            overrides_retry_at: StdMutex::new(None),
        })
    }

    pub fn install_path(&self) -> PathBuf {
        self.storage.install_path()
    }

    /// Number of remote `overrides.json` requests issued so far.
    pub fn override_fetch_count(&self) -> u64 {
        self.override_fetches.load(Ordering::Relaxed)
    }

    async fn kv_get(&self, key: &str) -> Option<String> {
        match self.kv.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "state read failed");
                None
            }
        }
    }

    // ============ Metadata & install state ============

    pub async fn fetch_remote_metadata(&self) -> Result<DictionaryMetadata, LookupError> {
        let url = self.distribution.url_for("metadata.json");
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.distribution.metadata_timeout_secs))
            .send()
            .await
            .map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(status_err(resp.status(), &url));
        }
        let metadata: DictionaryMetadata = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                http_err(e)
            } else {
                LookupError::Network(format!("invalid metadata from {}: {}", url, e))
            }
        })?;
        tracing::debug!(version = %metadata.version, "fetched remote metadata");
        Ok(metadata)
    }

    /// True only when the flag is set **and** the file exists.
    pub async fn is_installed(&self) -> bool {
        let flagged = self.kv_get(KEY_INSTALLED).await.as_deref() == Some("true");
        flagged
            && tokio::fs::try_exists(self.install_path())
                .await
                .unwrap_or(false)
    }

    pub async fn installed_version(&self) -> Option<String> {
        if self.is_installed().await {
            self.kv_get(KEY_VERSION).await
        } else {
            None
        }
    }

    pub async fn install_state(&self) -> InstallState {
        let installed = self.is_installed().await;
        InstallState {
            installed,
            installed_version: if installed {
                self.kv_get(KEY_VERSION).await
            } else {
                None
            },
            file_path: self.install_path(),
        }
    }

    /// Any inequality between installed and remote version strings is an update,
    /// including a remote version that sorts lower.
    pub async fn check_for_update(&self) -> Result<UpdateCheck, LookupError> {
        let metadata = self.fetch_remote_metadata().await?;
        let current = self.installed_version().await;
        Ok(UpdateCheck {
            available: current.as_deref() != Some(metadata.version.as_str()),
            current,
            latest: metadata.version,
        })
    }

    /// Resting status: `not_installed`, `installed`, or `update_available`.
    /// When the metadata endpoint is unreachable an install reports `installed`.
    pub async fn status(&self) -> InstallStatus {
        if !self.is_installed().await {
            return InstallStatus::NotInstalled;
        }
        match self.check_for_update().await {
            Ok(check) if check.available => InstallStatus::UpdateAvailable,
            Ok(_) => InstallStatus::Installed,
            Err(e) => {
                tracing::warn!(error = %e, "update check failed; reporting installed");
                InstallStatus::Installed
            }
        }
    }

    // ============ Download ============

    /// Download the bundle described by `metadata` into the downloads directory.
    pub async fn download_dictionary(
        &self,
        metadata: &DictionaryMetadata,
        events: Option<&EventSender>,
    ) -> Result<PathBuf, LookupError> {
        let dir = self.storage.download_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_err(&dir, e))?;
        let temp_path = dir.join(&metadata.filename);

        let same_bundle =
            self.kv_get(KEY_PARTIAL_VERSION).await.as_deref() == Some(metadata.version.as_str());
        if !same_bundle && tokio::fs::try_exists(&temp_path).await.unwrap_or(false) {
            tracing::debug!(path = %temp_path.display(), "removing stale partial download");
            tokio::fs::remove_file(&temp_path)
                .await
                .map_err(|e| write_err(&temp_path, e))?;
        }
        if let Err(e) = self.kv.set(KEY_PARTIAL_VERSION, &metadata.version).await {
            tracing::warn!(error = %e, "could not record partial download version");
        }

        let url = self.distribution.url_for(&metadata.filename);
        download_to(
            &self.client,
            &url,
            &temp_path,
            same_bundle,
            metadata.compressed_size,
            events,
        )
        .await?;

        if let Err(e) = verify_bundle(&temp_path, metadata).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            let _ = self.kv.remove(KEY_PARTIAL_VERSION).await;
            return Err(e);
        }
        Ok(temp_path)
    }

    // ============ Extract & install ============

    /// Decompress `temp_path` over the installed file; the previous install is
    /// untouched unless decompression fully succeeds.
    pub async fn extract_and_install(&self, temp_path: &Path) -> Result<(), LookupError> {
        let partial = decompress_to_partial(temp_path, &self.install_path()).await?;
        self.promote(&partial).await?;
        let _ = tokio::fs::remove_file(temp_path).await;
        Ok(())
    }

    async fn promote(&self, partial: &Path) -> Result<(), LookupError> {
        let target = self.install_path();
        if let Err(e) = tokio::fs::rename(partial, &target).await {
            let _ = tokio::fs::remove_file(partial).await;
            return Err(io_err(e));
        }
        Ok(())
    }

    /// Run the whole pipeline. Returns the installed metadata.
    pub async fn install_dictionary(
        &self,
        events: Option<&EventSender>,
    ) -> Result<DictionaryMetadata, LookupError> {
        let _guard = self.install_lock.lock().await;
        let mut pipeline = Pipeline {
            state: self.status_for_pipeline().await,
            events,
        };

        pipeline.advance(InstallStatus::Checking).await;
        let result = self.run_pipeline(&mut pipeline).await;
        match result {
            Ok(metadata) => {
                pipeline.advance(InstallStatus::Installed).await;
                tracing::info!(version = %metadata.version, "dictionary installed");
                Ok(metadata)
            }
            Err(e) => {
                pipeline.advance(InstallStatus::Error).await;
                tracing::error!(error = %e, "dictionary install failed");
                Err(e)
            }
        }
    }

    async fn status_for_pipeline(&self) -> InstallStatus {
        if self.is_installed().await {
            InstallStatus::Installed
        } else {
            InstallStatus::NotInstalled
        }
    }

    async fn run_pipeline(&self, pipeline: &mut Pipeline<'_>) -> Result<DictionaryMetadata, LookupError> {
        let metadata = self.fetch_remote_metadata().await?;

        pipeline.advance(InstallStatus::Downloading).await;
        let temp_path = self.download_dictionary(&metadata, pipeline.events).await?;

        pipeline.advance(InstallStatus::Extracting).await;
        let partial = decompress_to_partial(&temp_path, &self.install_path()).await?;

        pipeline.advance(InstallStatus::Installing).await;
        self.promote(&partial).await?;
        let _ = tokio::fs::remove_file(&temp_path).await;
        let _ = self.kv.remove(KEY_PARTIAL_VERSION).await;
        self.mark_installed(&metadata.version).await?;

        Ok(metadata)
    }

    async fn mark_installed(&self, version: &str) -> Result<(), LookupError> {
        let persist = async {
            self.kv.set(KEY_VERSION, version).await?;
            self.kv.set(KEY_INSTALLED, "true").await
        };
        persist
            .await
            .map_err(|e| LookupError::Database(format!("failed to persist install state: {}", e)))
    }

    /// Adopt an existing database file as the installed dictionary.
    pub async fn adopt_file(&self, source: &Path, version: &str) -> Result<(), LookupError> {
        let _guard = self.install_lock.lock().await;
        let target = self.install_path();
        let partial = target.with_extension("sqlite.partial");
        let src = source.to_path_buf();
        let dest = partial.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dest)?;
            Ok(())
        })
        .await
        .map_err(|e| LookupError::Database(format!("copy task failed: {}", e)))?
        .map_err(|e| LookupError::Database(format!("failed to copy {}: {}", source.display(), e)))?;

        self.promote(&partial)
            .await
            .map_err(|e| LookupError::Database(e.to_string()))?;
        self.mark_installed(version).await
    }

    /// Remove the installed file and forget install and override state.
    pub async fn delete_dictionary(&self) -> Result<(), LookupError> {
        let _guard = self.install_lock.lock().await;
        let path = self.install_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LookupError::Database(format!(
                    "failed to remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        for key in [KEY_INSTALLED, KEY_VERSION] {
            self.kv
                .remove(key)
                .await
                .map_err(|e| LookupError::Database(format!("failed to clear {}: {}", key, e)))?;
        }
        self.clear_override_cache().await;
        tracing::info!("dictionary deleted");
        Ok(())
    }

    // ============ Overrides ============

    /// Current override snapshot, or `None` when nothing is cached and the
    /// remote is unreachable. Never fails.
    pub async fn get_overrides(&self) -> Option<OverridesFile> {
        if let Some(hit) = self.overrides.get(OVERRIDES_MEMORY_KEY) {
            return Some(hit);
        }

        let durable = self.load_durable_overrides().await;
        if let Some((file, fetched_at)) = &durable {
            let age = (Utc::now() - *fetched_at).to_std().unwrap_or(Duration::ZERO);
            if age < self.overrides_ttl {
                self.overrides.insert_with_ttl(
                    OVERRIDES_MEMORY_KEY,
                    file.clone(),
                    self.overrides_ttl - age,
                );
                return Some(file.clone());
            }
        }

        if self.in_override_backoff() {
            return durable.map(|(file, _)| file);
        }

        match self.fetch_remote_overrides().await {
            Ok(file) => {
                self.store_overrides(&file).await;
                Some(file)
            }
            Err(e) => {
                tracing::warn!(error = %e, "override fetch failed; using last known snapshot");
                self.set_override_backoff(Some(Instant::now() + OVERRIDES_RETRY_AFTER));
                durable.map(|(file, _)| file)
            }
        }
    }

    fn in_override_backoff(&self) -> bool {
        let retry_at = *self
            .overrides_retry_at
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        retry_at.is_some_and(|at| Instant::now() < at)
    }

    fn set_override_backoff(&self, until: Option<Instant>) {
        *self
            .overrides_retry_at
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = until;
    }

    /// Bypass both caches and fetch now. Errors are surfaced.
    pub async fn refresh_overrides(&self) -> Result<OverridesFile, LookupError> {
        let file = self.fetch_remote_overrides().await?;
        self.store_overrides(&file).await;
        Ok(file)
    }

    pub async fn clear_override_cache(&self) {
        self.overrides.clear();
        self.set_override_backoff(None);
        for key in [KEY_OVERRIDES, KEY_OVERRIDES_FETCHED_AT] {
            if let Err(e) = self.kv.remove(key).await {
                tracing::warn!(key, error = %e, "failed to clear cached overrides");
            }
        }
    }

    async fn load_durable_overrides(&self) -> Option<(OverridesFile, DateTime<Utc>)> {
        let json = self.kv_get(KEY_OVERRIDES).await?;
        let file: OverridesFile = match serde_json::from_str(&json) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable cached overrides");
                return None;
            }
        };
        let fetched_at = self
            .kv_get(KEY_OVERRIDES_FETCHED_AT)
            .await
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default();
        Some((file, fetched_at))
    }

    async fn store_overrides(&self, file: &OverridesFile) {
        self.set_override_backoff(None);
        self.overrides.insert(OVERRIDES_MEMORY_KEY, file.clone());
        let json = match serde_json::to_string(file) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize overrides");
                return;
            }
        };
        let persisted = async {
            self.kv.set(KEY_OVERRIDES, &json).await?;
            self.kv
                .set(KEY_OVERRIDES_FETCHED_AT, &Utc::now().to_rfc3339())
                .await
        };
        if let Err(e) = persisted.await {
            tracing::warn!(error = %e, "failed to persist overrides");
        }
    }

    async fn fetch_remote_overrides(&self) -> Result<OverridesFile, LookupError> {
        self.override_fetches.fetch_add(1, Ordering::Relaxed);
        let url = self.distribution.url_for("overrides.json");
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.distribution.metadata_timeout_secs))
            .send()
            .await
            .map_err(http_err)?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!("no overrides published yet");
            return Ok(OverridesFile::empty());
        }
        if !resp.status().is_success() {
            return Err(status_err(resp.status(), &url));
        }
        let file: OverridesFile = resp
            .json()
            .await
            .map_err(|e| LookupError::Network(format!("invalid overrides from {}: {}", url, e)))?;
        tracing::debug!(entries = file.entries.len(), version = %file.version, "fetched overrides");
        Ok(file)
    }
}

#[async_trait]
impl OverrideSource for DistributionManager {
    async fn current(&self) -> Option<OverridesFile> {
        self.get_overrides().await
    }
}

/// Tracks the pipeline state and reports every transition.
struct Pipeline<'a> {
    state: InstallStatus,
    events: Option<&'a EventSender>,
}

impl Pipeline<'_> {
    async fn advance(&mut self, next: InstallStatus) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal install transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(from = %self.state, to = %next, "install status");
        self.state = next;
        emit(self.events, InstallEvent::Status(next)).await;
    }
}

/// Stream `url` into `path`. With `resume`, an existing partial file is
/// continued via a byte-range request when the server answers 206; a 416
/// discards it and downloads from the start.
pub async fn download_to(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    resume: bool,
    expected_total: u64,
    events: Option<&EventSender>,
) -> Result<u64, LookupError> {
    let mut existing = if resume {
        tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };
    if existing > 0 && existing == expected_total {
        emit(
            events,
            InstallEvent::Download(DownloadProgress::new(existing, expected_total)),
        )
        .await;
        return Ok(existing);
    }

    let mut request = client.get(url);
    if existing > 0 {
        request = request.header(RANGE, format!("bytes={}-", existing));
    }
    let mut resp = request.send().await.map_err(http_err)?;
    if existing > 0 && resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        // Leftover is complete or longer than the published bundle.
        tracing::debug!(offset = existing, "resume range rejected; restarting download");
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| write_err(path, e))?;
        existing = 0;
        resp = client.get(url).send().await.map_err(http_err)?;
    }
    let status = resp.status();

    let body_len = resp
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let (mut file, mut downloaded) = if existing > 0 && status == StatusCode::PARTIAL_CONTENT {
        tracing::debug!(offset = existing, "resuming download");
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| write_err(path, e))?;
        (file, existing)
    } else if status.is_success() {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| write_err(path, e))?;
        (file, 0)
    } else {
        return Err(status_err(status, url));
    };

    let total = body_len
        .map(|len| len + downloaded)
        .filter(|t| *t > 0)
        .unwrap_or(expected_total);
    emit(
        events,
        InstallEvent::Download(DownloadProgress::new(downloaded, total)),
    )
    .await;

    let step = (total / 100).max(64 * 1024);
    let mut last_reported = downloaded;
    while let Some(chunk) = resp.chunk().await.map_err(http_err)? {
        file.write_all(&chunk)
            .await
            .map_err(|e| write_err(path, e))?;
        downloaded += chunk.len() as u64;
        if downloaded - last_reported >= step {
            last_reported = downloaded;
            emit(
                events,
                InstallEvent::Download(DownloadProgress::new(downloaded, total)),
            )
            .await;
        }
    }
    file.flush().await.map_err(|e| write_err(path, e))?;
    if last_reported != downloaded {
        emit(
            events,
            InstallEvent::Download(DownloadProgress::new(downloaded, total)),
        )
        .await;
    }
    Ok(downloaded)
}

/// Size and optional SHA-256 check of a downloaded bundle.
async fn verify_bundle(path: &Path, metadata: &DictionaryMetadata) -> Result<(), LookupError> {
    let path = path.to_path_buf();
    let expected_size = metadata.compressed_size;
    let expected_sha = metadata.sha256.clone();
    tokio::task::spawn_blocking(move || -> Result<(), LookupError> {
        let file = std::fs::File::open(&path).map_err(|e| write_err(&path, e))?;
        let size = file.metadata().map_err(|e| write_err(&path, e))?.len();
        if expected_size > 0 && size != expected_size {
            return Err(LookupError::Network(format!(
                "downloaded bundle is {} bytes, expected {}",
                size, expected_size
            )));
        }
        if let Some(expected) = expected_sha {
            let mut reader = BufReader::new(file);
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf).map_err(|e| write_err(&path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(LookupError::Network(format!(
                    "bundle checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| LookupError::Network(format!("verification task failed: {}", e)))?
}

/// Gunzip `temp_path` next to `target` as `<target>.partial` and check the
/// SQLite header. The partial file is removed on any failure.
async fn decompress_to_partial(temp_path: &Path, target: &Path) -> Result<PathBuf, LookupError> {
    let src = temp_path.to_path_buf();
    let partial = target.with_extension("sqlite.partial");
    let dest = partial.clone();

    let result = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let input = BufReader::new(std::fs::File::open(&src)?);
        let mut decoder = GzDecoder::new(input);
        let mut output = BufWriter::new(std::fs::File::create(&dest)?);
        let written = std::io::copy(&mut decoder, &mut output)?;
        output.flush()?;
        output.get_ref().sync_all()?;

        let mut header = [0u8; 16];
        std::fs::File::open(&dest)?.read_exact(&mut header)?;
        if &header != SQLITE_HEADER {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "decompressed file is not a SQLite database",
            ));
        }
        Ok(written)
    })
    .await
    .map_err(|e| LookupError::Decompression(format!("decompression task failed: {}", e)))?;

    match result {
        Ok(bytes) => {
            tracing::debug!(bytes, path = %partial.display(), "bundle decompressed");
            Ok(partial)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(io_err(e))
        }
    }
}
