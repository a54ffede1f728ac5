//! Session lifecycle: the state machine and the shared cancellation signal.
//!
//! ```text
//! Starting → Running → Draining → Stopped
//! ```
//!
//! Several triggers can end a session (inbound EOF, a fatal stream error,
//! an OS termination signal, an unrecovered fault) and they can race. The
//! drain transition is claimed with a compare-and-swap so exactly one trigger
//! wins; every later trigger sees [`Lifecycle::begin_drain`] return `false`
//! and does nothing.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

const STARTING: u8 = 0;
const RUNNING: u8 = 1;
const DRAINING: u8 = 2;
const STOPPED: u8 = 3;

/// Lifecycle state of one relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Initialization in progress.
    Starting,
    /// The relay loop is processing lines.
    Running,
    /// A stop trigger won; buffered diagnostics are being flushed.
    Draining,
    /// Terminal.
    Stopped,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            STARTING => Self::Starting,
            RUNNING => Self::Running,
            DRAINING => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Owns the session's state machine and cancellation token.
///
/// The token is broadcast, not queued: once fired it stays fired and every
/// observer sees it, so each blocking point in the relay can poll it with a
/// `select!` arm without coordination.
pub struct Lifecycle {
    state: AtomicU8,
    shutdown: CancellationToken,
    started_at: Instant,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STARTING),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn mark_running(&self) {
        self.state.store(RUNNING, Ordering::SeqCst);
    }

    /// Claim the drain transition.
    ///
    /// Returns `true` for exactly one caller per session; that caller runs
    /// the drain sequence. Claiming also fires the cancellation token so
    /// every blocked activity unwinds.
    pub fn begin_drain(&self) -> bool {
        for current in [RUNNING, STARTING] {
            if self
                .state
                .compare_exchange(current, DRAINING, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.shutdown.cancel();
                return true;
            }
        }
        false
    }

    pub fn mark_stopped(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
    }

    /// A clone of the shared cancellation token, for blocking points.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Fire the shared cancellation signal. Idempotent.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Time since the session was created, for shutdown reporting.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
