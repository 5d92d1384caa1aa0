//! Tracing subscriber setup for the `lexi` binary.
//!
//! Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over the
//! default filter when set.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(verbose: bool, json: bool) -> Result<()> {
    let default_directive = if verbose {
        "lexibridge=debug,lexi=debug,info"
    } else {
        "lexibridge=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    // A second init (e.g. from tests) is not an error.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    Ok(())
}
