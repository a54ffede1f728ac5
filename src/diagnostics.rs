//! The durable audit log of relay activity.
//!
//! Every message that crosses the relay (raw input, outbound body, inbound
//! body, timings, failures) is recorded through a [`DiagnosticsSink`]. The
//! file-backed sink flushes and fsyncs on every record so that a crash
//! immediately afterward loses nothing already recorded. Accepted trade-off:
//! each record costs a physical write, which is fine at this relay's volume
//! (one request in flight at a time).
//!
//! The sink is an injected capability: the relay loop is written once and
//! runs with either the durable [`FileSink`] or the [`NullSink`].

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only record sink shared by all relay activities.
///
/// `record` must be safe for concurrent callers, and records must appear in
/// emission order: implementations serialize format+write+sync under one
/// lock so lines from concurrent activities never interleave mid-line.
pub trait DiagnosticsSink: Send + Sync {
    /// Append one record. By the time this returns the record is durable.
    fn record(&self, text: &str);

    /// Final flush before the session ends.
    fn close(&self);
}

/// Durable file-backed sink.
///
/// Each record is prefixed with a local timestamp at microsecond precision,
/// written, and fsynced before `record` returns. Write failures are reported
/// on the tracing channel rather than propagated; a broken audit log must
/// not take the relay down with it.
#[derive(Debug)]
pub struct FileSink {
    inner: Mutex<File>,
    path: PathBuf,
}

impl FileSink {
    pub fn new(file: File, path: PathBuf) -> Self {
        Self {
            inner: Mutex::new(file),
            path,
        }
    }

    /// Where the records are going, for startup announcements.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticsSink for FileSink {
    fn record(&self, text: &str) {
        let stamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.6f");
        let mut file = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{stamp} {text}") {
            tracing::warn!(error = %e, "failed to write diagnostics record");
            return;
        }
        if let Err(e) = file.sync_all() {
            tracing::warn!(error = %e, "failed to sync diagnostics log");
        }
    }

    fn close(&self) {
        let file = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.sync_all() {
            tracing::warn!(error = %e, "failed to sync diagnostics log on close");
        }
    }
}

/// Sink that drops every record, for runs with diagnostics disabled.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _text: &str) {}

    fn close(&self) {}
}

/// Route panic reports through the diagnostics sink before the default hook
/// prints them, so a fault's context is durable even when stderr is lost.
///
/// The backtrace is best-effort: whether it carries symbols depends on the
/// build and on `RUST_BACKTRACE`.
pub fn install_panic_hook(sink: std::sync::Arc<dyn DiagnosticsSink>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        sink.record(&format!("PANIC: {info}"));
        sink.record(&format!(
            "stack trace:\n{}",
            std::backtrace::Backtrace::force_capture()
        ));
        previous(info);
    }));
}
