//! Context injection: handing the remote process enough identity to
//! report results back.
//!
//! The payload is written exactly once per session, before the trigger
//! fires. The remote side may assume the context is fully written and
//! readable as soon as it receives the locator, so the write is flushed
//! and synced before `inject` returns.

use crate::channel::Channel;
use crate::errors::{ChannelError, SessionError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

/// Version of the context wire format. Readers must ignore unknown keys,
/// so additive changes do not bump this.
const CONTEXT_VERSION: u32 = 1;

/// Run and asset identity for one orchestration attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPayload {
    pub run_id: String,
    pub asset_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default)]
    pub retry_number: i64,
    /// Caller-supplied extra parameters, passed through opaquely.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

impl ContextPayload {
    pub fn new(run_id: impl Into<String>, asset_key: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            asset_key: asset_key.into(),
            ..Self::default()
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

/// Envelope as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct ContextEnvelope {
    version: u32,
    #[serde(flatten)]
    payload: ContextPayload,
}

/// Opaque location of a written context channel, handed to the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLocator(pub String);

impl std::fmt::Display for ChannelLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize `payload` into the context channel and return its locator.
///
/// Completes the write (flush + sync) before returning; the caller may hand
/// the locator to the trigger immediately afterwards.
pub fn inject(channel: &Channel, payload: &ContextPayload) -> Result<ChannelLocator, SessionError> {
    let envelope = ContextEnvelope {
        version: CONTEXT_VERSION,
        payload: payload.clone(),
    };
    let encoded = serde_json::to_vec(&envelope).map_err(SessionError::Serialization)?;

    let write = |encoded: &[u8]| -> std::io::Result<()> {
        let mut file = std::fs::File::create(channel.path())?;
        file.write_all(encoded)?;
        file.sync_all()
    };
    write(&encoded).map_err(|source| {
        SessionError::Channel(ChannelError::Write {
            role: channel.role(),
            path: channel.path().to_path_buf(),
            source,
        })
    })?;

    tracing::debug!(path = %channel.path().display(), "context injected");
    Ok(ChannelLocator(channel.locator()))
}

/// Decode a context envelope, ignoring unknown keys.
///
/// This is the remote side of the handoff; the crate exposes it so tests
/// and in-process remotes can read what `inject` wrote.
pub fn read_context(locator: &ChannelLocator) -> Result<ContextPayload, SessionError> {
    let bytes = std::fs::read(&locator.0).map_err(|source| {
        SessionError::Channel(ChannelError::Read {
            path: locator.0.clone().into(),
            source,
        })
    })?;
    let envelope: ContextEnvelope =
        serde_json::from_slice(&bytes).map_err(SessionError::Serialization)?;
    Ok(envelope.payload)
}
