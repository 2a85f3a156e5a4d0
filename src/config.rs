use std::path::PathBuf;
use std::time::Duration;

/// Default polling interval for the message channel (100ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default quiescence window before an idle channel counts as drained (2s).
const DEFAULT_QUIESCENCE_MS: u64 = 2000;

/// Default bound on the whole drain phase (5 minutes).
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 300;

/// How the coordinator decides the remote is done writing messages.
///
/// The drain phase always ends at `drain_timeout` regardless of policy;
/// reaching that bound is a hung-remote failure, not a clean close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// End the drain when the remote emits a `closed` record.
    Sentinel,
    /// End the drain once no new bytes have appeared for the configured
    /// quiescence window.
    Quiescence,
}

/// Configuration for a session coordinator.
///
/// One value is shared across all sessions a coordinator opens; there is no
/// process-wide state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory for channel files. Defaults to the OS temp directory.
    pub channel_dir: Option<PathBuf>,
    /// Interval between polls of the message channel.
    pub poll_interval: Duration,
    /// Idle window after which a quiescence-terminated drain closes.
    pub quiescence_window: Duration,
    /// Upper bound on the drain phase; exceeding it is a timeout failure.
    pub drain_timeout: Duration,
    /// Termination signal policy.
    pub termination: Termination,
    /// Treat a single malformed record as a session failure instead of
    /// skipping it.
    pub strict_decode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_dir: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            quiescence_window: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            termination: Termination::Sentinel,
            strict_decode: false,
        }
    }
}

impl SessionConfig {
    /// Place channel files under `dir` instead of the OS temp directory.
    pub fn with_channel_dir(mut self, dir: PathBuf) -> Self {
        self.channel_dir = Some(dir);
        self
    }

    /// Set the message channel polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the quiescence window.
    pub fn with_quiescence_window(mut self, window: Duration) -> Self {
        self.quiescence_window = window;
        self
    }

    /// Set the drain timeout.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the termination policy.
    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    /// Enable or disable strict decoding.
    pub fn with_strict_decode(mut self, strict: bool) -> Self {
        self.strict_decode = strict;
        self
    }
}
