//! Session lifecycle: the handshake between the orchestrator and one
//! remote computation.
//!
//! A session owns exactly two channels (context + messages) and walks a
//! fixed state machine: `Open → Triggered → Draining → Closed`. The
//! coordinator:
//! - allocates both channels and injects the context (`open`)
//! - hands the channel locators to the caller-supplied trigger
//! - drains the message channel once the trigger has returned, translating
//!   records into outcomes as they arrive
//! - releases both channels on every exit path, including trigger failure
//!   and drop
//!
//! The remote side is a separate, independently scheduled process; the only
//! shared state is the two channel files, each with a single writer and a
//! single reader.

use crate::channel::{Channel, ChannelRole, ChannelStore};
use crate::config::{SessionConfig, Termination};
use crate::context::{ChannelLocator, ContextPayload, inject};
use crate::errors::SessionError;
use crate::message::{Message, MessageStream};
use crate::translate::{Outcome, Translator};
use std::time::{Duration, Instant};

/// Where a session is in its lifecycle.
///
/// `Open` is momentary: `SessionCoordinator::open` injects the context
/// before returning, so callers first observe `Triggered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Triggered,
    Draining,
    Closed,
}

/// The two opaque channel locations handed to the trigger.
#[derive(Debug, Clone)]
pub struct SessionLocators {
    pub context: ChannelLocator,
    pub messages: ChannelLocator,
}

/// Counters describing one drained session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub outcomes_yielded: u64,
    pub logs_forwarded: u64,
    pub malformed_skipped: u64,
    pub drain_duration: Duration,
}

/// Result of a full `SessionCoordinator::run` lifecycle.
///
/// `error` is set when the drain ended abnormally (timeout, channel I/O,
/// strict-mode decode failure); outcomes translated before the failure are
/// kept, not discarded.
#[derive(Debug)]
pub struct SessionOutput<T> {
    /// Value returned by the trigger invocation.
    pub value: T,
    pub outcomes: Vec<Outcome>,
    pub stats: SessionStats,
    pub error: Option<SessionError>,
}

/// Opens sessions against a channel store. Holds no per-session state.
#[derive(Debug, Clone)]
pub struct SessionCoordinator {
    config: SessionConfig,
    store: ChannelStore,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        let store = ChannelStore::new(config.channel_dir.clone());
        Self { config, store }
    }

    /// Open a session: allocate both channels and inject the context.
    ///
    /// The returned session is in `Triggered`; the caller invokes the
    /// external trigger with `locators()` and then either calls
    /// `run_trigger` (which does both) or `mark_triggered`.
    pub fn open(&self, payload: &ContextPayload) -> Result<Session, SessionError> {
        let context_channel = self.store.allocate(ChannelRole::Context)?;
        let message_channel = match self.store.allocate(ChannelRole::Messages) {
            Ok(channel) => channel,
            Err(err) => {
                self.store.release(&context_channel);
                return Err(err.into());
            }
        };

        let context_locator = match inject(&context_channel, payload) {
            Ok(locator) => locator,
            Err(err) => {
                self.store.release(&context_channel);
                self.store.release(&message_channel);
                return Err(err);
            }
        };

        let locators = SessionLocators {
            context: context_locator,
            messages: ChannelLocator(message_channel.locator()),
        };
        let stream = MessageStream::open(&message_channel);

        tracing::debug!(
            run_id = %payload.run_id,
            asset_key = %payload.asset_key,
            "session opened"
        );

        Ok(Session {
            store: self.store.clone(),
            config: self.config.clone(),
            context_channel,
            message_channel,
            locators,
            stream,
            translator: Translator::new(),
            state: SessionState::Triggered,
            drain_started: None,
            last_activity: None,
            drain_duration: Duration::ZERO,
            malformed_skipped: 0,
            closed_marker_seen: false,
        })
    }

    /// Full lifecycle in one call: open, trigger, drain, close.
    ///
    /// Trigger failure propagates as `SessionError::Trigger` after both
    /// channels are released. A drain failure is reported in
    /// `SessionOutput::error` alongside any outcomes already translated.
    pub async fn run<T, F, Fut>(
        &self,
        payload: &ContextPayload,
        trigger: F,
    ) -> Result<SessionOutput<T>, SessionError>
    where
        F: FnOnce(SessionLocators) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut session = self.open(payload)?;
        let value = session.run_trigger(trigger).await?;

        let mut outcomes = Vec::new();
        let mut error = None;
        loop {
            match session.next_outcome().await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => break,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        Ok(SessionOutput {
            value,
            outcomes,
            stats: session.stats(),
            error,
        })
    }
}

/// One end-to-end attempt at triggering and collecting results from one
/// remote computation.
pub struct Session {
    store: ChannelStore,
    config: SessionConfig,
    context_channel: Channel,
    message_channel: Channel,
    locators: SessionLocators,
    stream: MessageStream,
    translator: Translator,
    state: SessionState,
    drain_started: Option<Instant>,
    last_activity: Option<Instant>,
    drain_duration: Duration,
    malformed_skipped: u64,
    closed_marker_seen: bool,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Channel locations to hand to the external trigger.
    pub fn locators(&self) -> &SessionLocators {
        &self.locators
    }

    /// Run the caller's trigger with the channel locators.
    ///
    /// On success the session moves to `Draining`. On failure both channels
    /// are released and the error propagates as `SessionError::Trigger` —
    /// the session is `Closed` and yields no outcomes.
    pub async fn run_trigger<T, F, Fut>(&mut self, trigger: F) -> Result<T, SessionError>
    where
        F: FnOnce(SessionLocators) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.state != SessionState::Triggered {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "run trigger",
            });
        }

        match trigger(self.locators.clone()).await {
            Ok(value) => {
                self.mark_triggered()?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "trigger invocation failed, closing session");
                self.close();
                Err(SessionError::Trigger(err))
            }
        }
    }

    /// Record that the external trigger call has returned; begins the
    /// drain phase. For callers driving the trigger themselves.
    pub fn mark_triggered(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Triggered {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "mark triggered",
            });
        }
        let now = Instant::now();
        self.state = SessionState::Draining;
        self.drain_started = Some(now);
        self.last_activity = Some(now);
        Ok(())
    }

    /// Pull the next outcome from the message channel.
    ///
    /// Polls at the configured interval until a materialization or check
    /// record is available. Returns `Ok(None)` on clean termination — the
    /// `closed` sentinel, or quiescence under that policy — after which the
    /// session is `Closed` and the channels are released. Exceeding
    /// `drain_timeout` without a termination signal closes the session and
    /// fails with `SessionError::Timeout`.
    pub async fn next_outcome(&mut self) -> Result<Option<Outcome>, SessionError> {
        match self.state {
            SessionState::Closed => return Ok(None),
            SessionState::Draining => {}
            state => {
                return Err(SessionError::InvalidState {
                    state,
                    action: "read outcomes",
                });
            }
        }

        loop {
            let had_new = match self.stream.fill() {
                Ok(had_new) => had_new,
                Err(err) => {
                    self.close();
                    return Err(err.into());
                }
            };
            if had_new {
                self.last_activity = Some(Instant::now());
            }

            while let Some(item) = self.stream.pop() {
                match item {
                    Ok(Message::Closed) => {
                        self.closed_marker_seen = true;
                    }
                    Ok(message) => {
                        if let Some(outcome) = self.translator.translate(message) {
                            return Ok(Some(outcome));
                        }
                    }
                    Err(bad) => {
                        if self.config.strict_decode {
                            self.close();
                            return Err(bad.into());
                        }
                        tracing::warn!(
                            line = bad.line,
                            reason = %bad.reason,
                            raw = %bad.raw,
                            "skipping malformed message record"
                        );
                        self.malformed_skipped += 1;
                    }
                }
            }

            // Pending queue is empty; decide whether the stream is over.
            if self.closed_marker_seen {
                self.close();
                return Ok(None);
            }
            if self.config.termination == Termination::Quiescence
                && self
                    .last_activity
                    .is_some_and(|at| at.elapsed() >= self.config.quiescence_window)
            {
                self.close();
                return Ok(None);
            }
            if self
                .drain_started
                .is_some_and(|at| at.elapsed() >= self.config.drain_timeout)
            {
                self.close();
                return Err(SessionError::Timeout {
                    timeout: self.config.drain_timeout,
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Force the session to `Closed` from any state, releasing both
    /// channels. Any unread tail of the message channel is abandoned;
    /// outcomes already yielded remain valid.
    pub fn abort(&mut self) {
        if self.state != SessionState::Closed {
            tracing::debug!(state = ?self.state, "aborting session");
            self.close();
        }
    }

    /// Counters for this session. Drain duration is final once `Closed`.
    pub fn stats(&self) -> SessionStats {
        let drain_duration = if self.state == SessionState::Closed {
            self.drain_duration
        } else {
            self.drain_started.map(|at| at.elapsed()).unwrap_or_default()
        };
        SessionStats {
            outcomes_yielded: self.translator.outcomes_yielded(),
            logs_forwarded: self.translator.logs_forwarded(),
            malformed_skipped: self.malformed_skipped,
            drain_duration,
        }
    }

    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        // A record that never reached its delimiter was never emitted.
        self.stream.discard_partial();
        self.store.release(&self.context_channel);
        self.store.release(&self.message_channel);
        if let Some(started) = self.drain_started {
            self.drain_duration = started.elapsed();
        }
        self.state = SessionState::Closed;
        tracing::debug!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Channels are released on every exit path, panics included.
        self.close();
    }
}
