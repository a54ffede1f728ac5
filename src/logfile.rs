//! Diagnostics log location discovery.
//!
//! The relay must have a writable append target before the loop starts, but
//! it should not die just because the preferred directory is missing: the
//! candidates are tried in order (`$HOME/.mcpipe/logs`, then `./logs`, then
//! the OS temp directory) and the first one that opens wins. Only when every
//! candidate fails is startup aborted.
//!
//! Filenames carry the upstream port and a timestamp so logs from multiple
//! concurrent relay sessions sort next to their server.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::diagnostics::FileSink;
use crate::error::RelayError;

/// Open the diagnostics log, trying each candidate location in order.
///
/// When `override_dir` is set it is the only candidate.
///
/// # Errors
///
/// Returns [`RelayError::DiagnosticsUnavailable`] when no candidate
/// directory yields a writable file.
pub fn open_diagnostics(
    target_url: &str,
    override_dir: Option<&Path>,
) -> Result<FileSink, RelayError> {
    let filename = log_filename(target_url, Local::now());

    for dir in candidate_dirs(override_dir) {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "cannot create log directory");
            continue;
        }
        let path = dir.join(&filename);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => return Ok(FileSink::new(file, path)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot open log file");
            }
        }
    }

    Err(RelayError::DiagnosticsUnavailable)
}

fn candidate_dirs(override_dir: Option<&Path>) -> Vec<PathBuf> {
    if let Some(dir) = override_dir {
        return vec![dir.to_path_buf()];
    }

    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".mcpipe").join("logs"));
    }
    candidates.push(PathBuf::from("./logs"));
    candidates.push(std::env::temp_dir());
    candidates
}

fn log_filename(target_url: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.log", port_label(target_url), now.format("%m%d%y%H%M%S"))
}

/// Port component for the log filename.
///
/// Explicit port if the URL has one, the scheme default for http/https,
/// `noport` for schemes without a default, `unknown` when the URL does not
/// parse at all (the relay will fail on it later; the log still opens).
fn port_label(target_url: &str) -> String {
    match reqwest::Url::parse(target_url) {
        Ok(url) => match url.port_or_known_default() {
            Some(port) => port.to_string(),
            None => "noport".to_string(),
        },
        Err(_) => "unknown".to_string(),
    }
}
