//! Logging initialization for the operator CLI: logs go to stderr so stdout stays free for
//! `mcp` subcommand output (table/JSON) that a script might pipe or parse.
//!
//! Reads `RUST_LOG` (level filter) from env; defaults to `info`.

use tracing_subscriber::EnvFilter;

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string().into())
}
