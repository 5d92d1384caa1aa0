//! `lexi` subcommand implementations.
//!
//! Each `run_*` function prints its result to stdout, either as aligned
//! text or (with `--json`) as one pretty-printed JSON document. Progress
//! and logs go to stderr.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use lexibridge_core::models::{Direction, ExtendedTranslateResult};

use crate::app::Lexibridge;
use crate::builder;
use crate::lookup::ForwardLookup;
use crate::orchestrator::TranslateOptions;
use crate::progress::{spawn_reporter, ProgressMode};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn join_or_dash(values: Option<&Vec<String>>) -> String {
    match values {
        Some(v) if !v.is_empty() => v.join(", "),
        _ => "-".to_string(),
    }
}

pub async fn run_install(app: &Lexibridge, progress: ProgressMode, json: bool) -> Result<()> {
    let (tx, reporter) = spawn_reporter(progress.reporter());
    let result = app.install(Some(&tx)).await;
    drop(tx);
    let _ = reporter.await;

    let metadata = result?;
    if json {
        print_json(&metadata)?;
    } else {
        println!(
            "Installed dictionary {} ({} bytes, {})",
            metadata.version, metadata.uncompressed_size, metadata.license
        );
    }
    Ok(())
}

pub async fn run_status(app: &Lexibridge, json: bool) -> Result<()> {
    let state = app.install_state().await;
    let status = app.install_status().await;
    if json {
        return print_json(&serde_json::json!({
            "status": status,
            "installed": state.installed,
            "installed_version": state.installed_version,
            "file_path": state.file_path,
        }));
    }
    println!("status:    {}", status);
    println!(
        "version:   {}",
        state.installed_version.as_deref().unwrap_or("-")
    );
    println!("file:      {}", state.file_path.display());
    Ok(())
}

pub async fn run_check_update(app: &Lexibridge, json: bool) -> Result<()> {
    let check = app.check_for_update().await?;
    if json {
        return print_json(&check);
    }
    if check.available {
        println!(
            "Update available: {} -> {}",
            check.current.as_deref().unwrap_or("(none)"),
            check.latest
        );
    } else {
        println!("Up to date ({})", check.latest);
    }
    Ok(())
}

pub async fn run_delete(app: &Lexibridge) -> Result<()> {
    app.delete().await?;
    println!("Dictionary deleted.");
    Ok(())
}

pub async fn run_lookup(app: &Lexibridge, word: &str, json: bool) -> Result<()> {
    let found = app.lookup(word).await?;
    if json {
        return print_json(&found);
    }
    print_forward(&found);
    Ok(())
}

fn print_forward(found: &ForwardLookup) {
    let r = &found.result;
    println!("{}  [{}]", r.text, r.source);
    println!("  readings: {}", join_or_dash(r.readings.as_ref()));
    println!("  pos:      {}", join_or_dash(r.part_of_speech.as_ref()));
    for (i, group) in found.entries.iter().enumerate().skip(1) {
        let meanings: Vec<&str> = group.glosses.iter().map(|g| g.gloss_text.as_str()).collect();
        println!(
            "  {}. {} ({}) {}",
            i + 1,
            group.entry.headword(),
            group.entry.kana,
            meanings.join("; ")
        );
    }
}

pub async fn run_reverse(app: &Lexibridge, text: &str, json: bool) -> Result<()> {
    let entries = app.reverse(text).await?;
    if json {
        return print_json(&entries);
    }
    for entry in &entries {
        let head = entry.kanji.as_deref().unwrap_or(&entry.kana);
        let common = if entry.is_common { " *" } else { "" };
        println!("{} ({}){}", head, entry.kana, common);
        println!("  {}", entry.meanings.join("; "));
    }
    Ok(())
}

pub async fn run_translate(
    app: &Lexibridge,
    text: &str,
    direction: Option<Direction>,
    no_fallback: bool,
    json: bool,
) -> Result<()> {
    let options = TranslateOptions {
        direction,
        allow_fallback: !no_fallback,
        ..TranslateOptions::default()
    };
    let out = app.translate(text, options).await?;
    if json {
        return print_json(&out);
    }
    print_translation(&out);
    Ok(())
}

fn print_translation(out: &ExtendedTranslateResult) {
    let cached = if out.from_cache { ", cached" } else { "" };
    println!(
        "{}  [{} {}{}]",
        out.result.text,
        out.result.source,
        out.direction.as_str(),
        cached
    );
    if let Some(readings) = out.result.readings.as_ref().filter(|r| !r.is_empty()) {
        println!("  readings: {}", readings.join(", "));
    }
}

pub async fn run_overrides(app: &Lexibridge, refresh: bool, json: bool) -> Result<()> {
    let file = if refresh {
        Some(app.refresh_overrides().await?)
    } else {
        app.overrides().await
    };
    let Some(file) = file else {
        println!("No overrides available (offline and nothing cached).");
        return Ok(());
    };
    if json {
        return print_json(&file);
    }
    println!(
        "overrides version {} ({} entries, updated {})",
        if file.version.is_empty() { "-" } else { file.version.as_str() },
        file.entries.len(),
        file.updated_at.format("%Y-%m-%d %H:%M")
    );
    for o in &file.entries {
        println!(
            "  #{:<5} {:<10} {:<20} {}",
            o.id,
            format!("{:?}", o.override_type).to_lowercase(),
            o.word,
            o.effective_meaning().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_build(jmdict: &Path, out: &Path) -> Result<()> {
    let summary = builder::build_from_jmdict(jmdict, out).await?;
    println!(
        "Built {} ({} entries, {} glosses)",
        out.display(),
        summary.entries,
        summary.glosses
    );
    Ok(())
}

pub async fn run_pack(db: &Path, out_dir: &Path, version: &str) -> Result<()> {
    let metadata = builder::pack_bundle(db, out_dir, version).await?;
    println!(
        "Packed {} ({} -> {} bytes) into {}",
        metadata.filename,
        metadata.uncompressed_size,
        metadata.compressed_size,
        out_dir.display()
    );
    Ok(())
}
