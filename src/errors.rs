//! Typed error hierarchy for the pipes session core.
//!
//! Two top-level enums cover the two subsystems:
//! - `ChannelError` — allocation and read failures on file-backed channels
//! - `SessionError` — everything a session can surface to its caller
//!
//! `MalformedMessage` sits apart: a single undecodable record is recoverable
//! (skip-and-continue) and only becomes a `SessionError` under strict decoding.

use crate::channel::ChannelRole;
use crate::session::SessionState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the channel store and message reader I/O paths.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to create channel directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to allocate {role} channel at {path}: {source}")]
    Allocate {
        role: ChannelRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {role} channel at {path}: {source}")]
    Write {
        role: ChannelRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read message channel at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single message record that could not be decoded.
///
/// Reported per-record through the stream; the session skips it (with a
/// warning) unless strict decoding is enabled.
#[derive(Debug, Clone, Error)]
#[error("Malformed message record on line {line}: {reason}")]
pub struct MalformedMessage {
    /// 1-based record number within the message channel.
    pub line: u64,
    /// Decoder error text.
    pub reason: String,
    /// The offending record, truncated for logging.
    pub raw: String,
}

/// Errors from a single session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Failed to encode context payload: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Remote did not signal completion within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Trigger invocation failed: {0}")]
    Trigger(#[source] anyhow::Error),

    #[error(transparent)]
    Malformed(#[from] MalformedMessage),

    #[error("Cannot {action} in state {state:?}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
}
