//! mcpipe entry point.
//!
//! Startup sequence: parse args, init tracing (stderr, since stdout belongs to
//! the protocol), open the diagnostics sink, build the session, run the
//! relay, exit with its code. Startup failures exit non-zero before the
//! relay loop ever starts.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mcpipe::cli::RelayArgs;
use mcpipe::diagnostics::{install_panic_hook, DiagnosticsSink, NullSink};
use mcpipe::logfile;
use mcpipe::relay::{self, RelaySession};

#[tokio::main]
async fn main() {
    let args = RelayArgs::parse();
    init_tracing(args.verbose);

    let code = run(args).await;
    std::process::exit(code);
}

async fn run(args: RelayArgs) -> i32 {
    let diagnostics: Arc<dyn DiagnosticsSink> = if args.no_log {
        Arc::new(NullSink)
    } else {
        match logfile::open_diagnostics(&args.target_url, args.log_dir.as_deref()) {
            Ok(sink) => {
                eprintln!("mcpipe: logging to {}", sink.path().display());
                Arc::new(sink)
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot open diagnostics log");
                eprintln!("mcpipe: {e}");
                return 1;
            }
        }
    };

    install_panic_hook(Arc::clone(&diagnostics));

    let session = match RelaySession::new(
        args.target_url,
        Duration::from_secs(args.request_timeout),
        diagnostics,
    ) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("mcpipe: {e}");
            return 1;
        }
    };

    record_startup(&session);
    tracing::info!(target = %session.target_url, "starting relay");

    relay::run(session).await
}

/// Record the startup banner so every log begins with enough context to
/// reconstruct the run.
fn record_startup(session: &RelaySession) {
    let diagnostics = &session.diagnostics;
    diagnostics.record("=== mcpipe session started ===");
    diagnostics.record(&format!("version: {}", env!("CARGO_PKG_VERSION")));
    diagnostics.record(&format!("target URL: {}", session.target_url));
    diagnostics.record(&format!("process id: {}", std::process::id()));
    match std::env::current_exe() {
        Ok(path) => diagnostics.record(&format!("executable: {}", path.display())),
        Err(e) => diagnostics.record(&format!("executable: unavailable ({e})")),
    }
    match std::env::current_dir() {
        Ok(path) => diagnostics.record(&format!("working directory: {}", path.display())),
        Err(e) => diagnostics.record(&format!("working directory: unavailable ({e})")),
    }
}

/// Initialise tracing with stderr output.
///
/// When `verbose` is true, sets the filter to `debug`. Otherwise respects
/// `RUST_LOG` (defaulting to no output, since most hosts surface stderr).
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
