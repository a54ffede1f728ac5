//! CLI argument types.
//!
//! Defined separately from `main.rs` so tests can construct and parse them
//! directly.

use std::path::PathBuf;

use clap::Parser;

/// Relay line-delimited JSON-RPC on stdio to a streamable-HTTP endpoint.
#[derive(Parser, Debug)]
#[command(name = "mcpipe", version)]
pub struct RelayArgs {
    /// Upstream JSON-RPC endpoint URL (e.g. http://127.0.0.1:8080/mcp).
    pub target_url: String,

    /// Overall timeout for each forwarded HTTP request, in seconds.
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    /// Write the diagnostics log under this directory instead of the
    /// default locations.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Disable the diagnostics log entirely.
    #[arg(long)]
    pub no_log: bool,

    /// Enable debug logging on stderr.
    #[arg(long)]
    pub verbose: bool,
}
