//! Translation of wire messages into orchestrator-facing outcomes.
//!
//! Log records are side-effected into `tracing` and yield nothing;
//! materialization and check records map one-to-one onto outcomes in
//! input order. No buffering — an outcome is produced the moment its
//! source message is available.

use crate::message::{LogLevel, Message};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A materialized entity reported by the remote process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationRecord {
    pub entity: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A named check the remote process evaluated against an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub entity: String,
    pub check: String,
    pub passed: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Domain-level result yielded to the caller. Terminal once yielded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Materialization(MaterializationRecord),
    Check(CheckRecord),
}

/// Stateless mapping from messages to outcomes, plus the counters that
/// feed session stats.
#[derive(Debug, Default)]
pub struct Translator {
    logs_forwarded: u64,
    outcomes_yielded: u64,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one message. Log and lifecycle records yield `None`.
    pub fn translate(&mut self, message: Message) -> Option<Outcome> {
        match message {
            Message::Log { level, message } => {
                self.forward_log(level, &message);
                None
            }
            Message::Materialization { entity, metadata } => {
                self.outcomes_yielded += 1;
                Some(Outcome::Materialization(MaterializationRecord {
                    entity,
                    metadata,
                }))
            }
            Message::Check {
                entity,
                check,
                pass,
                metadata,
            } => {
                self.outcomes_yielded += 1;
                Some(Outcome::Check(CheckRecord {
                    entity,
                    check,
                    passed: pass,
                    metadata,
                }))
            }
            Message::Opened | Message::Closed => None,
        }
    }

    pub fn logs_forwarded(&self) -> u64 {
        self.logs_forwarded
    }

    pub fn outcomes_yielded(&self) -> u64 {
        self.outcomes_yielded
    }

    fn forward_log(&mut self, level: LogLevel, message: &str) {
        self.logs_forwarded += 1;
        match level {
            LogLevel::Trace => tracing::trace!(target: "pipes_core::remote", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "pipes_core::remote", "{message}"),
            LogLevel::Info => tracing::info!(target: "pipes_core::remote", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "pipes_core::remote", "{message}"),
            LogLevel::Error => tracing::error!(target: "pipes_core::remote", "{message}"),
        }
    }
}
