//! End-to-end tests against an in-process HTTP server that plays both the
//! distribution endpoint (metadata, gzip bundle, overrides) and DeepL.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tempfile::TempDir;

use lexibridge::app::Lexibridge;
use lexibridge::builder::{self, BuildEntry, BuildGloss};
use lexibridge::config::{Config, DistributionConfig, LookupConfig, StorageConfig, TranslatorConfig};
use lexibridge::deepl::DeepLTranslator;
use lexibridge::orchestrator::TranslateOptions;
use lexibridge::progress::{spawn_reporter, InstallEvent, ProgressReporter};
use lexibridge_core::kv::{KeyValueStore, MemoryKvStore};
use lexibridge_core::models::{DictionaryMetadata, EngineState, InputKind, InstallStatus};
use lexibridge_core::translator::{DisabledTranslator, Translator};
use lexibridge_core::{ErrorKind, TranslationSource};

const VERSION: &str = "2024.06.01";
const DEEPL_KEY: &str = "test-key:fx";

// ============ Mock server ============

struct Mock {
    metadata: Mutex<DictionaryMetadata>,
    bundle: Vec<u8>,
    overrides: Mutex<Option<String>>,
    override_hits: AtomicUsize,
    deepl_hits: AtomicUsize,
    ranges: Mutex<Vec<String>>,
}

async fn metadata_handler(State(mock): State<Arc<Mock>>) -> Response {
    let metadata = mock.metadata.lock().unwrap().clone();
    Json(metadata).into_response()
}

async fn bundle_handler(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    let data = &mock.bundle;
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(range) = range {
        mock.ranges.lock().unwrap().push(range.clone());
        let start = range
            .strip_prefix("bytes=")
            .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok());
        if let Some(start) = start.filter(|s| *s < data.len()) {
            let content_range = format!("bytes {}-{}/{}", start, data.len() - 1, data.len());
            return (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, content_range)],
                data[start..].to_vec(),
            )
                .into_response();
        }
    }
    (StatusCode::OK, data.clone()).into_response()
}

async fn overrides_handler(State(mock): State<Arc<Mock>>) -> Response {
    mock.override_hits.fetch_add(1, Ordering::SeqCst);
    match mock.overrides.lock().unwrap().clone() {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn deepl_handler(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    mock.deepl_hits.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("DeepL-Auth-Key {}", DEEPL_KEY).as_str());
    if !authorized {
        return StatusCode::FORBIDDEN.into_response();
    }
    let text = form.get("text").cloned().unwrap_or_default();
    let translated = match (text.as_str(), form.get("target_lang").map(String::as_str)) {
        ("run", Some("JA")) => "走る".to_string(),
        (other, Some(target)) => format!("[{}] {}", target, other),
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    Json(serde_json::json!({
        "translations": [{"detected_source_language": form.get("source_lang"), "text": translated}]
    }))
    .into_response()
}

struct Fixture {
    tmp: TempDir,
    addr: SocketAddr,
    mock: Arc<Mock>,
}

impl Fixture {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn config(&self, translator: TranslatorConfig) -> Config {
        Config {
            storage: StorageConfig {
                data_dir: self.tmp.path().join("data"),
                seed_db: None,
            },
            distribution: DistributionConfig {
                base_url: self.base_url(),
                timeout_secs: 10,
                metadata_timeout_secs: 5,
                overrides_ttl_secs: 3600,
            },
            lookup: LookupConfig::default(),
            translator,
        }
    }

    fn app(&self, kv: Arc<dyn KeyValueStore>, translator: Arc<dyn Translator>) -> Lexibridge {
        Lexibridge::with_parts(&self.config(TranslatorConfig::default()), kv, translator).unwrap()
    }

    fn deepl(&self) -> Arc<dyn Translator> {
        Arc::new(
            DeepLTranslator::new(
                format!("{}/deepl", self.base_url()),
                Some(DEEPL_KEY.to_string()),
                Duration::from_secs(5),
            )
            .unwrap(),
        )
    }

    fn set_overrides(&self, json: Option<&str>) {
        *self.mock.overrides.lock().unwrap() = json.map(str::to_string);
    }
}

fn entry(id: i64, kanji: &str, kana: &str, common: bool, priority: i64, glosses: &[&str]) -> BuildEntry {
    BuildEntry {
        id,
        kanji: Some(kanji.to_string()),
        kana: kana.to_string(),
        is_common: common,
        priority,
        glosses: glosses
            .iter()
            .enumerate()
            .map(|(i, g)| BuildGloss {
                text: g.to_string(),
                part_of_speech: Some("n".to_string()),
                sense_index: i as i64,
            })
            .collect(),
    }
}

fn sample_entries() -> Vec<BuildEntry> {
    vec![
        entry(1, "技能", "ぎのう", true, 1, &["skills", "ability"]),
        entry(2, "技能目録", "ぎのうもくろく", true, 9, &["skills inventory system"]),
        entry(3, "食べる", "たべる", true, 2, &["to eat"]),
        entry(4, "喰う", "くう", false, 0, &["to eat", "to live on"]),
        entry(5, "猫", "ねこ", true, 3, &["cat"]),
        entry(6, "犬", "いぬ", true, 3, &["dog"]),
    ]
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let publish = tmp.path().join("publish");
    let db_path = publish.join("dictionary.sqlite");
    builder::build_database(&sample_entries(), &db_path, VERSION)
        .await
        .unwrap();
    let metadata = builder::pack_bundle(&db_path, &publish.join("out"), VERSION)
        .await
        .unwrap();
    let bundle = fs::read(publish.join("out").join(&metadata.filename)).unwrap();

    let bundle_route = format!("/{}", metadata.filename);
    let mock = Arc::new(Mock {
        metadata: Mutex::new(metadata),
        bundle,
        overrides: Mutex::new(None),
        override_hits: AtomicUsize::new(0),
        deepl_hits: AtomicUsize::new(0),
        ranges: Mutex::new(Vec::new()),
    });

    let router = Router::new()
        .route("/metadata.json", get(metadata_handler))
        .route("/overrides.json", get(overrides_handler))
        .route("/deepl", post(deepl_handler))
        .route(&bundle_route, get(bundle_handler))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Fixture { tmp, addr, mock }
}

struct Recording(Arc<Mutex<Vec<InstallEvent>>>);

impl ProgressReporter for Recording {
    fn report(&self, event: &InstallEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

async fn install(app: &Lexibridge) -> Vec<InstallEvent> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, handle) = spawn_reporter(Box::new(Recording(seen.clone())));
    app.install(Some(&tx)).await.unwrap();
    drop(tx);
    handle.await.unwrap();
    let events = seen.lock().unwrap().clone();
    events
}

// ============ Distribution ============

#[tokio::test]
async fn install_reports_every_stage_and_delete_uninstalls() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    assert!(!app.distribution().is_installed().await);
    assert_eq!(app.install_status().await, InstallStatus::NotInstalled);

    let events = install(&app).await;
    let statuses: Vec<InstallStatus> = events
        .iter()
        .filter_map(|e| match e {
            InstallEvent::Status(s) => Some(*s),
            InstallEvent::Download(_) => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            InstallStatus::Checking,
            InstallStatus::Downloading,
            InstallStatus::Extracting,
            InstallStatus::Installing,
            InstallStatus::Installed,
        ]
    );
    let last_progress = events.iter().rev().find_map(|e| match e {
        InstallEvent::Download(p) => Some(*p),
        InstallEvent::Status(_) => None,
    });
    assert!((last_progress.unwrap().percentage - 100.0).abs() < 1e-9);

    assert!(app.distribution().is_installed().await);
    let state = app.install_state().await;
    assert_eq!(state.installed_version.as_deref(), Some(VERSION));
    assert!(state.file_path.exists());
    assert!(!app.check_for_update().await.unwrap().available);

    app.delete().await.unwrap();
    assert!(!app.distribution().is_installed().await);
    assert!(!state.file_path.exists());
    let err = app.lookup("cat").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
}

#[tokio::test]
async fn new_remote_version_is_an_update() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    fx.mock.metadata.lock().unwrap().version = "2024.07.01".to_string();
    let check = app.check_for_update().await.unwrap();
    assert!(check.available);
    assert_eq!(check.current.as_deref(), Some(VERSION));
    assert_eq!(app.install_status().await, InstallStatus::UpdateAvailable);
}

#[tokio::test]
async fn interrupted_download_resumes_with_range() {
    let fx = fixture().await;
    let kv = Arc::new(MemoryKvStore::new());
    let app = fx.app(kv.clone(), Arc::new(DisabledTranslator));

    let filename = fx.mock.metadata.lock().unwrap().filename.clone();
    let downloads = fx.tmp.path().join("data/downloads");
    fs::create_dir_all(&downloads).unwrap();
    let half = fx.mock.bundle.len() / 2;
    fs::write(downloads.join(&filename), &fx.mock.bundle[..half]).unwrap();
    kv.set("download.partial_version", VERSION).await.unwrap();

    install(&app).await;
    assert_eq!(
        fx.mock.ranges.lock().unwrap().clone(),
        vec![format!("bytes={}-", half)]
    );
    assert!(!downloads.join(&filename).exists());
    assert_eq!(app.lookup("cat").await.unwrap().result.text, "猫");
}

#[tokio::test]
async fn leftover_from_another_version_is_discarded() {
    let fx = fixture().await;
    let kv = Arc::new(MemoryKvStore::new());
    let app = fx.app(kv.clone(), Arc::new(DisabledTranslator));

    let filename = fx.mock.metadata.lock().unwrap().filename.clone();
    let downloads = fx.tmp.path().join("data/downloads");
    fs::create_dir_all(&downloads).unwrap();
    fs::write(downloads.join(&filename), b"garbage from an older bundle").unwrap();
    kv.set("download.partial_version", "2023.01.01").await.unwrap();

    install(&app).await;
    assert!(fx.mock.ranges.lock().unwrap().is_empty());
    assert!(app.distribution().is_installed().await);
}

// ============ Overrides ============

const OVERRIDES: &str = r#"{
    "version": "12",
    "updated_at": "2024-06-10T00:00:00Z",
    "entries": [
        {"id": 1, "type": "deletion", "word": "cat",
         "source_issue": 101, "approved_at": "2024-06-09T00:00:00Z"},
        {"id": 2, "type": "correction", "word": "Dog",
         "original_meaning": "犬", "corrected_meaning": "ワンちゃん", "reading": "わんちゃん",
         "source_issue": 102, "approved_at": "2024-06-09T00:00:00Z"}
    ]
}"#;

#[tokio::test]
async fn overrides_are_fetched_once_within_ttl() {
    let fx = fixture().await;
    fx.set_overrides(Some(OVERRIDES));
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));

    let first = app.overrides().await.unwrap();
    let second = app.overrides().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.entries.len(), 2);
    assert_eq!(fx.mock.override_hits.load(Ordering::SeqCst), 1);
    assert_eq!(app.distribution().override_fetch_count(), 1);
}

#[tokio::test]
async fn missing_overrides_file_is_an_empty_snapshot() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    let file = app.overrides().await.unwrap();
    assert!(file.entries.is_empty());
}

#[tokio::test]
async fn deletion_and_correction_overrides_apply_to_lookups() {
    let fx = fixture().await;
    fx.set_overrides(Some(OVERRIDES));
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    let err = app.lookup("cat").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WordNotFound);

    let corrected = app.lookup("dog").await.unwrap();
    assert_eq!(corrected.result.text, "ワンちゃん");
    assert_eq!(corrected.result.source, TranslationSource::Override);
    assert_eq!(corrected.result.readings, Some(vec!["わんちゃん".to_string()]));
}

#[tokio::test]
async fn refreshed_overrides_invalidate_cached_results() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    assert_eq!(app.lookup("cat").await.unwrap().result.text, "猫");
    fx.set_overrides(Some(OVERRIDES));
    app.refresh_overrides().await.unwrap();
    assert_eq!(
        app.lookup("cat").await.unwrap_err().kind(),
        ErrorKind::WordNotFound
    );
}

// ============ Lookup ============

#[tokio::test]
async fn ranking_prefers_priority_then_whole_word_heads() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    let eat = app.lookup("eat").await.unwrap();
    assert_eq!(eat.result.text, "食べる");
    assert_eq!(
        eat.result.readings,
        Some(vec!["たべる".to_string(), "くう".to_string()])
    );

    let skill = app.lookup("skill").await.unwrap();
    assert_eq!(skill.result.text, "技能");
    assert_eq!(skill.entries[0].glosses[0].gloss_text, "skills");
}

#[tokio::test]
async fn repeated_lookup_is_served_from_cache() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    let first = app.lookup("to eat").await.unwrap();
    let queries = app.engine().query_count();
    let second = app.lookup("To Eat").await.unwrap();
    assert!(second.from_cache);
    assert_eq!(first.result, second.result);
    assert_eq!(app.engine().query_count(), queries);
}

#[tokio::test]
async fn reverse_lookup_matches_katakana_input() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), Arc::new(DisabledTranslator));
    install(&app).await;

    let entries = app.reverse("イヌ").await.unwrap();
    assert_eq!(entries[0].kanji.as_deref(), Some("犬"));
    assert_eq!(entries[0].meanings, vec!["dog"]);
}

// ============ Orchestrator ============

#[tokio::test]
async fn dictionary_miss_falls_back_to_deepl() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), fx.deepl());
    install(&app).await;

    let out = app.translate("run", TranslateOptions::default()).await.unwrap();
    assert_eq!(out.result.text, "走る");
    assert_eq!(out.result.source, TranslationSource::Deepl);
    assert!(out.dictionary_attempted);
    assert_eq!(fx.mock.deepl_hits.load(Ordering::SeqCst), 1);

    let again = app.translate("run", TranslateOptions::default()).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(fx.mock.deepl_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sentences_never_touch_the_dictionary() {
    let fx = fixture().await;
    let app = fx.app(Arc::new(MemoryKvStore::new()), fx.deepl());
    install(&app).await;

    let out = app
        .translate("I would like to eat", TranslateOptions::default())
        .await
        .unwrap();
    assert_eq!(out.input_kind, InputKind::Sentence);
    assert!(!out.dictionary_attempted);
    assert_eq!(out.result.source, TranslationSource::Deepl);
    assert_eq!(app.engine_state(), EngineState::Idle);
    assert_eq!(app.engine().query_count(), 0);
}

#[tokio::test]
async fn wrong_deepl_key_is_auth_failure() {
    let fx = fixture().await;
    let translator: Arc<dyn Translator> = Arc::new(
        DeepLTranslator::new(
            format!("{}/deepl", fx.base_url()),
            Some("wrong".to_string()),
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    let app = fx.app(Arc::new(MemoryKvStore::new()), translator);
    let err = app
        .translate("where is the station", TranslateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);
}

// ============ CLI ============

fn lexi(config: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_lexi"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run lexi");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn write_config(root: &Path, base_url: &str) -> PathBuf {
    let path = root.join("lexi.toml");
    fs::write(
        &path,
        format!(
            "[storage]\ndata_dir = \"{}\"\n\n[distribution]\nbase_url = \"{}\"\ntimeout_secs = 5\nmetadata_timeout_secs = 2\n",
            root.join("data").display(),
            base_url
        ),
    )
    .unwrap();
    path
}

#[test]
fn cli_build_and_pack_produce_a_bundle() {
    let tmp = TempDir::new().unwrap();
    let jmdict = tmp.path().join("jmdict.json");
    fs::write(
        &jmdict,
        r#"{"version": "3.5.0", "words": [
            {"id": "1", "kanji": [{"common": true, "text": "猫"}],
             "kana": [{"common": true, "text": "ねこ"}],
             "sense": [{"partOfSpeech": ["n"], "gloss": [{"lang": "eng", "text": "cat"}]}]}
        ]}"#,
    )
    .unwrap();
    let db = tmp.path().join("dict.sqlite");
    let config = tmp.path().join("unused.toml");

    let (stdout, stderr, ok) = lexi(
        &config,
        &["build", "--jmdict", jmdict.to_str().unwrap(), "--out", db.to_str().unwrap()],
    );
    assert!(ok, "build failed: {}", stderr);
    assert!(stdout.contains("1 entries"));

    let out_dir = tmp.path().join("public");
    let (_, stderr, ok) = lexi(
        &config,
        &[
            "pack",
            "--db",
            db.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
            "--version",
            "v1",
        ],
    );
    assert!(ok, "pack failed: {}", stderr);
    let metadata: DictionaryMetadata =
        serde_json::from_str(&fs::read_to_string(out_dir.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata.version, "v1");
    assert!(out_dir.join(&metadata.filename).exists());
}

#[test]
fn cli_status_reports_not_installed() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "http://127.0.0.1:9");
    let (stdout, stderr, ok) = lexi(&config, &["status", "--json"]);
    assert!(ok, "status failed: {}", stderr);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["status"], "not_installed");
    assert_eq!(status["installed"], false);
}

#[test]
fn cli_rejects_bad_config() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "ftp://nope");
    let (_, stderr, ok) = lexi(&config, &["status"]);
    assert!(!ok);
    assert!(stderr.contains("base_url"));
}
