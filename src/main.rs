//! # lexibridge CLI (`lexi`)
//!
//! ## Usage
//!
//! ```bash
//! lexi --config ./config/lexi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexi install` | Download and install the latest dictionary bundle |
//! | `lexi status` | Show install status and version |
//! | `lexi check-update` | Compare the installed version with the published one |
//! | `lexi delete` | Remove the installed dictionary |
//! | `lexi lookup <word>` | English → Japanese dictionary lookup |
//! | `lexi reverse <text>` | Japanese → English dictionary lookup |
//! | `lexi translate <text>` | Dictionary first, DeepL fallback |
//! | `lexi overrides` | Show (or `--refresh`) community overrides |
//! | `lexi build` | Build a dictionary database from jmdict-simplified JSON |
//! | `lexi pack` | Gzip a database and write `metadata.json` for publishing |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lexibridge::app::Lexibridge;
use lexibridge::commands;
use lexibridge::config;
use lexibridge::logging;
use lexibridge::progress::ProgressMode;
use lexibridge_core::models::Direction;

/// lexibridge: offline-first English ⇄ Japanese dictionary.
///
/// All commands except `build` and `pack` read a TOML configuration file.
/// See `config/lexi.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "lexi", version, about = "Offline-first English/Japanese dictionary")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexi.toml")]
    config: PathBuf,

    /// Install progress on stderr: `human`, `json`, or `off`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true, value_parser = parse_progress)]
    progress: Option<ProgressMode>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify, and install the latest dictionary.
    ///
    /// An interrupted download is resumed on the next run when the
    /// published version has not changed.
    Install,

    /// Show whether a dictionary is installed, and which version.
    Status,

    /// Check whether a different dictionary version is published.
    CheckUpdate,

    /// Delete the installed dictionary and cached overrides.
    Delete,

    /// Look up an English word.
    Lookup {
        word: String,
    },

    /// Look up a Japanese word by kanji or kana.
    Reverse {
        text: String,
    },

    /// Translate a word or sentence.
    ///
    /// Words go to the dictionary first; sentences (and dictionary misses,
    /// unless `--no-fallback`) go to the configured translator.
    Translate {
        text: String,

        /// `en-ja` or `ja-en`. Detected from the script when omitted.
        #[arg(long)]
        direction: Option<Direction>,

        /// Never call the external translator after a dictionary miss.
        #[arg(long)]
        no_fallback: bool,
    },

    /// Show the community override snapshot.
    Overrides {
        /// Fetch a fresh copy now instead of using the cache.
        #[arg(long)]
        refresh: bool,
    },

    /// Build a dictionary database from a jmdict-simplified JSON file.
    Build {
        #[arg(long)]
        jmdict: PathBuf,

        #[arg(long)]
        out: PathBuf,
    },

    /// Gzip a dictionary database and write `metadata.json` for publishing.
    Pack {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        out_dir: PathBuf,

        #[arg(long)]
        version: String,
    },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}': use human, json, or off", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs)?;

    // Publishing commands don't need a config.
    match &cli.command {
        Commands::Build { jmdict, out } => return commands::run_build(jmdict, out).await,
        Commands::Pack {
            db,
            out_dir,
            version,
        } => return commands::run_pack(db, out_dir, version).await,
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    let app = Lexibridge::open(&cfg).await?;
    let json = cli.json;

    match cli.command {
        Commands::Install => {
            let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_install(&app, progress, json).await?;
        }
        Commands::Status => commands::run_status(&app, json).await?,
        Commands::CheckUpdate => commands::run_check_update(&app, json).await?,
        Commands::Delete => commands::run_delete(&app).await?,
        Commands::Lookup { word } => commands::run_lookup(&app, &word, json).await?,
        Commands::Reverse { text } => commands::run_reverse(&app, &text, json).await?,
        Commands::Translate {
            text,
            direction,
            no_fallback,
        } => commands::run_translate(&app, &text, direction, no_fallback, json).await?,
        Commands::Overrides { refresh } => commands::run_overrides(&app, refresh, json).await?,
        Commands::Build { .. } | Commands::Pack { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
