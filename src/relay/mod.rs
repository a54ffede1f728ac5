//! Session wiring: concurrent activities, signal handling, drain-once
//! shutdown.
//!
//! A session runs a small fixed set of activities (the relay loop, a parked
//! placeholder for the reverse direction, and one task per observed OS
//! signal) all coordinated through the lifecycle's single cancellation
//! token. Whichever of them stops first claims the drain; everyone else
//! unwinds through the token.

pub mod forward;
pub mod pump;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;

use crate::diagnostics::DiagnosticsSink;
use crate::error::RelayError;
use crate::lifecycle::Lifecycle;

pub use forward::Forwarder;

/// How long the relay loop gets to observe cancellation after a signal
/// before it is abandoned.
const SIGNAL_DRAIN_GRACE: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Relay Session
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one relay run shares: target, HTTP client, lifecycle, audit
/// log.
///
/// Created once at startup, owned by the lifecycle orchestration in [`run`];
/// the loop and forwarder borrow it for the session's duration.
pub struct RelaySession {
    pub target_url: String,
    pub client: reqwest::Client,
    pub lifecycle: Lifecycle,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

impl RelaySession {
    /// Build a session with an HTTP client bound to `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Client`] when the client cannot be constructed.
    pub fn new(
        target_url: String,
        request_timeout: Duration,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RelayError::Client)?;

        Ok(Self {
            target_url,
            client,
            lifecycle: Lifecycle::new(),
            diagnostics,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestration
// ─────────────────────────────────────────────────────────────────────────────

/// What ended the session; decides the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    StreamClosed,
    Signal,
    StreamError,
    Fault,
}

impl StopReason {
    fn is_fault(self) -> bool {
        matches!(self, Self::StreamError | Self::Fault)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamClosed => write!(f, "inbound stream closed"),
            Self::Signal => write!(f, "termination signal"),
            Self::StreamError => write!(f, "inbound stream error"),
            Self::Fault => write!(f, "unrecovered fault"),
        }
    }
}

/// Run one relay session to completion and return the process exit code.
///
/// Zero for normal completion (inbound EOF or a termination signal),
/// non-zero when a stream error or fault forced the stop. An unrecovered
/// panic in the loop is recorded to diagnostics, the drain runs, and the
/// panic is then resumed so the process's default fault behavior still
/// applies.
pub async fn run(session: Arc<RelaySession>) -> i32 {
    let shutdown = session.lifecycle.shutdown_token();
    session.lifecycle.mark_running();
    tracing::info!(target = %session.target_url, "relay running");

    spawn_signal_handlers(&session);

    // Reserved upstream→client direction. The HTTP transport never
    // initiates messages toward the client, so this activity parks until
    // cancellation.
    let reverse = tokio::spawn({
        let token = shutdown.clone();
        async move { token.cancelled().await }
    });

    let mut pump_task = tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            let writer = Arc::new(tokio::sync::Mutex::new(tokio::io::stdout()));
            pump::pump(&session, reader, writer).await
        }
    });

    let reason = tokio::select! {
        result = &mut pump_task => settle_pump(&session, result),
        _ = shutdown.cancelled() => {
            // A signal fired mid-line or mid-forward. The loop observes the
            // token at its next blocking point; give it a moment, then stop
            // waiting.
            match tokio::time::timeout(SIGNAL_DRAIN_GRACE, &mut pump_task).await {
                Ok(result) => {
                    let _ = settle_pump(&session, result);
                }
                Err(_) => {
                    tracing::warn!("relay loop did not stop within grace period, aborting");
                    pump_task.abort();
                }
            }
            StopReason::Signal
        }
    };

    session.lifecycle.cancel();
    let _ = reverse.await;

    drain(&session, reason);
    i32::from(reason.is_fault())
}

/// Classify how the relay loop task ended.
///
/// A panicking loop is the one path that does not return: diagnostics are
/// made durable, the drain runs, and the panic resumes.
fn settle_pump(
    session: &RelaySession,
    result: Result<Result<(), RelayError>, JoinError>,
) -> StopReason {
    match result {
        Ok(Ok(())) => {
            tracing::info!("inbound stream finished");
            StopReason::StreamClosed
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "relay loop failed");
            session.diagnostics.record(&format!("relay loop failed: {e}"));
            StopReason::StreamError
        }
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            session
                .diagnostics
                .record(&format!("PANIC in relay loop: {}", panic_text(&payload)));
            drain(session, StopReason::Fault);
            std::panic::resume_unwind(payload);
        }
        Err(e) => {
            tracing::error!(error = %e, "relay loop aborted");
            StopReason::Fault
        }
    }
}

/// Flush and close the audit log exactly once, whatever triggered the stop.
fn drain(session: &RelaySession, reason: StopReason) {
    if !session.lifecycle.begin_drain() {
        return;
    }

    let uptime = session.lifecycle.uptime();
    session.diagnostics.record(&format!(
        "session draining: {reason}, uptime {}.{:03}s",
        uptime.as_secs(),
        uptime.subsec_millis()
    ));
    session.diagnostics.record("=== mcpipe session ended ===");
    session.diagnostics.close();
    session.lifecycle.mark_stopped();
    tracing::info!(%reason, uptime_ms = uptime.as_millis() as u64, "session stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Signal Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Wire OS termination signals to the session's cancellation token.
///
/// Interrupt is observed everywhere via `ctrl_c`; terminate, quit, and
/// hangup are Unix-only. All of them funnel into the same graceful-drain
/// path; the handlers only record the signal and fire the token.
fn spawn_signal_handlers(session: &Arc<RelaySession>) {
    let interrupt = Arc::clone(session);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received interrupt signal, initiating shutdown");
                interrupt.diagnostics.record("received interrupt signal");
                interrupt.lifecycle.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for interrupt signal");
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::quit(), "SIGQUIT"),
            (SignalKind::hangup(), "SIGHUP"),
        ] {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        tracing::info!(signal = name, "received signal, initiating shutdown");
                        session.diagnostics.record(&format!("received {name}"));
                        session.lifecycle.cancel();
                    }
                    Err(e) => {
                        tracing::error!(signal = name, error = %e, "failed to install handler");
                    }
                }
            });
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
