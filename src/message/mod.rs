//! Wire messages emitted by the remote process.
//!
//! One JSON record per line, discriminated by a `kind` field. Unknown
//! fields within a known kind are ignored for forward compatibility.

pub mod reader;

pub use reader::MessageStream;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Events from the remote process's message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    /// Remote log line, forwarded to the orchestrator's logging.
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },

    /// The remote produced (materialized) an entity.
    Materialization {
        entity: String,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },

    /// The remote evaluated a named check against an entity.
    Check {
        entity: String,
        check: String,
        pass: bool,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },

    /// Lifecycle marker: the remote has read the context and started.
    Opened,

    /// Lifecycle marker: the remote is done writing messages.
    Closed,
}

/// Severity of a remote log record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

/// Truncate a raw record for inclusion in errors and logs.
pub(crate) fn truncate_record(raw: &str, max_len: usize) -> String {
    if raw.len() <= max_len {
        raw.to_string()
    } else {
        let mut end = max_len;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &raw[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_materialization() {
        let json = r#"{"kind":"materialization","entity":"pg_pipes_asset","metadata":{"rows":42}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();

        match msg {
            Message::Materialization { entity, metadata } => {
                assert_eq!(entity, "pg_pipes_asset");
                assert_eq!(metadata["rows"], serde_json::json!(42));
            }
            other => panic!("expected materialization, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_check_without_metadata() {
        let json = r#"{"kind":"check","entity":"pg_pipes_asset","check":"freshness","pass":true}"#;
        let msg: Message = serde_json::from_str(json).unwrap();

        match msg {
            Message::Check {
                check,
                pass,
                metadata,
                ..
            } => {
                assert_eq!(check, "freshness");
                assert!(pass);
                assert!(metadata.is_empty());
            }
            other => panic!("expected check, got {other:?}"),
        }
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let json = r#"{"kind":"log","message":"starting query"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();

        assert_eq!(
            msg,
            Message::Log {
                level: LogLevel::Info,
                message: "starting query".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_fields_within_known_kind_are_ignored() {
        let json = r#"{"kind":"closed","exit_code":0}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg, Message::Closed);
    }

    #[test]
    fn test_truncate_record_respects_char_boundaries() {
        assert_eq!(truncate_record("short", 10), "short");
        let truncated = truncate_record("héllo wörld", 6);
        assert!(truncated.ends_with("..."));
    }
}
