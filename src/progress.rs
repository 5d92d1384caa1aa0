//! Install progress reporting.
//!
//! The distribution manager emits [`InstallEvent`]s on a `tokio::sync::mpsc`
//! channel in pipeline order. The CLI drains that channel into a
//! [`ProgressReporter`] that writes to **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lexibridge_core::models::{DownloadProgress, InstallStatus};

/// A single install pipeline event.
#[derive(Clone, Debug, PartialEq)]
pub enum InstallEvent {
    /// The pipeline entered a new state.
    Status(InstallStatus),
    /// Bytes received so far for the bundle download.
    Download(DownloadProgress),
}

pub type EventSender = mpsc::Sender<InstallEvent>;

/// Reports install progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &InstallEvent);
}

/// Human-friendly progress on stderr: "install  downloading  1,234,567 / 9,000,000 bytes (13.7%)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &InstallEvent) {
        let line = match event {
            InstallEvent::Status(status) => format!("install  {}\n", status),
            InstallEvent::Download(p) => format!(
                "install  downloading  {} / {} bytes ({:.1}%)\n",
                format_number(p.downloaded_bytes),
                format_number(p.total_bytes),
                p.percentage
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &InstallEvent) {
        let obj = match event {
            InstallEvent::Status(status) => serde_json::json!({
                "event": "status",
                "status": status,
            }),
            InstallEvent::Download(p) => serde_json::json!({
                "event": "progress",
                "downloaded_bytes": p.downloaded_bytes,
                "total_bytes": p.total_bytes,
                "percentage": p.percentage,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &InstallEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Create an event channel whose receiving side feeds `reporter` until all
/// senders are dropped.
pub fn spawn_reporter(reporter: Box<dyn ProgressReporter>) -> (EventSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<InstallEvent>(64);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            reporter.report(&event);
        }
    });
    (tx, handle)
}
