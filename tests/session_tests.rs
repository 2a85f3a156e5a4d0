//! End-to-end session tests.
//!
//! These drive the full handshake with the remote side played by the test:
//! reading the context channel and appending records to the message channel
//! the way an out-of-process computation would.

use pipes_core::{
    ContextPayload, Outcome, SessionConfig, SessionCoordinator, SessionError, SessionState,
    Termination,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn fast_config(dir: &TempDir) -> SessionConfig {
    SessionConfig::default()
        .with_channel_dir(dir.path().to_path_buf())
        .with_poll_interval(Duration::from_millis(5))
        .with_quiescence_window(Duration::from_millis(60))
        .with_drain_timeout(Duration::from_secs(5))
}

/// Append raw lines to a message channel, as the remote writer would.
fn remote_write(messages_path: &str, records: &[&str]) {
    let mut file = OpenOptions::new().append(true).open(messages_path).unwrap();
    for record in records {
        writeln!(file, "{record}").unwrap();
    }
    file.flush().unwrap();
}

#[tokio::test]
async fn materialization_then_check_yields_outcomes_in_order() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(fast_config(&dir));
    let payload = ContextPayload::new("r1", "pg_pipes_asset");

    let output = coordinator
        .run(&payload, |locators| async move {
            // The remote reads the context before producing any message.
            let context = pipes_core::context::read_context(&locators.context)?;
            assert_eq!(context.run_id, "r1");
            assert_eq!(context.asset_key, "pg_pipes_asset");

            remote_write(
                &locators.messages.0,
                &[
                    r#"{"kind":"opened"}"#,
                    r#"{"kind":"log","level":"info","message":"querying pg_tables"}"#,
                    r#"{"kind":"materialization","entity":"pg_pipes_asset","metadata":{}}"#,
                    r#"{"kind":"check","entity":"pg_pipes_asset","check":"freshness","pass":true}"#,
                    r#"{"kind":"closed"}"#,
                ],
            );
            Ok(())
        })
        .await
        .unwrap();

    assert!(output.error.is_none());
    assert_eq!(output.outcomes.len(), 2);
    match &output.outcomes[0] {
        Outcome::Materialization(record) => assert_eq!(record.entity, "pg_pipes_asset"),
        other => panic!("expected materialization first, got {other:?}"),
    }
    match &output.outcomes[1] {
        Outcome::Check(record) => {
            assert_eq!(record.check, "freshness");
            assert!(record.passed);
        }
        other => panic!("expected check second, got {other:?}"),
    }
    assert_eq!(output.stats.logs_forwarded, 1);
    assert_eq!(output.stats.outcomes_yielded, 2);
}

#[tokio::test]
async fn empty_channel_drains_to_empty_outcome_sequence() {
    let dir = TempDir::new().unwrap();
    let coordinator =
        SessionCoordinator::new(fast_config(&dir).with_termination(Termination::Quiescence));

    let output = coordinator
        .run(&ContextPayload::new("r1", "asset"), |_| async { Ok(()) })
        .await
        .unwrap();

    assert!(output.error.is_none());
    assert!(output.outcomes.is_empty());
    assert_eq!(output.stats.outcomes_yielded, 0);
}

#[tokio::test]
async fn trigger_failure_releases_channels_and_propagates() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(fast_config(&dir));

    let mut session = coordinator.open(&ContextPayload::new("r1", "asset")).unwrap();
    let locators = session.locators().clone();

    let err = session
        .run_trigger(|_| async { Err::<(), _>(anyhow::anyhow!("database unreachable")) })
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Trigger(_)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!PathBuf::from(&locators.context.0).exists());
    assert!(!PathBuf::from(&locators.messages.0).exists());
    // Zero outcomes after a failed trigger.
    assert!(session.next_outcome().await.unwrap().is_none());
}

#[tokio::test]
async fn truncated_trailing_record_is_discarded_silently() {
    let dir = TempDir::new().unwrap();
    let coordinator =
        SessionCoordinator::new(fast_config(&dir).with_termination(Termination::Quiescence));

    let output = coordinator
        .run(&ContextPayload::new("r1", "asset"), |locators| async move {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&locators.messages.0)
                .unwrap();
            write!(
                file,
                "{}\n{}",
                r#"{"kind":"materialization","entity":"a","metadata":{}}"#,
                r#"{"kind":"check","entity":"a""#
            )
            .unwrap();
            Ok(())
        })
        .await
        .unwrap();

    // Exactly one outcome; the partial record never completed and is not
    // reported as malformed.
    assert!(output.error.is_none());
    assert_eq!(output.outcomes.len(), 1);
    assert_eq!(output.stats.malformed_skipped, 0);
}

#[tokio::test]
async fn records_written_while_draining_stream_through() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(fast_config(&dir));

    let mut session = coordinator.open(&ContextPayload::new("r1", "asset")).unwrap();
    let messages_path = session.locators().messages.0.clone();
    session.mark_triggered().unwrap();

    // Remote still flushing after the trigger call returned.
    let writer = tokio::spawn(async move {
        for i in 0..3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let record =
                format!(r#"{{"kind":"materialization","entity":"e{i}","metadata":{{}}}}"#);
            remote_write(&messages_path, &[record.as_str()]);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remote_write(&messages_path, &[r#"{"kind":"closed"}"#]);
    });

    let mut entities = Vec::new();
    while let Some(outcome) = session.next_outcome().await.unwrap() {
        match outcome {
            Outcome::Materialization(record) => entities.push(record.entity),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    writer.await.unwrap();

    assert_eq!(entities, vec!["e0", "e1", "e2"]);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn malformed_record_is_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(fast_config(&dir));

    let output = coordinator
        .run(&ContextPayload::new("r1", "asset"), |locators| async move {
            remote_write(
                &locators.messages.0,
                &[
                    r#"{"kind":"materialization","entity":"a","metadata":{}}"#,
                    r#"{"kind":"materialization""#, // complete line, bad JSON
                    r#"{"kind":"check","entity":"a","check":"rows","pass":false}"#,
                    r#"{"kind":"closed"}"#,
                ],
            );
            Ok(())
        })
        .await
        .unwrap();

    assert!(output.error.is_none());
    assert_eq!(output.outcomes.len(), 2);
    assert_eq!(output.stats.malformed_skipped, 1);
}

#[tokio::test]
async fn malformed_record_fails_session_under_strict_decode() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(fast_config(&dir).with_strict_decode(true));

    let output = coordinator
        .run(&ContextPayload::new("r1", "asset"), |locators| async move {
            remote_write(
                &locators.messages.0,
                &[
                    r#"{"kind":"materialization","entity":"a","metadata":{}}"#,
                    "garbage",
                    r#"{"kind":"closed"}"#,
                ],
            );
            Ok(())
        })
        .await
        .unwrap();

    // The outcome translated before the bad record is kept.
    assert_eq!(output.outcomes.len(), 1);
    assert!(matches!(output.error, Some(SessionError::Malformed(_))));
}

#[tokio::test]
async fn hung_remote_times_out_but_keeps_partial_outcomes() {
    let dir = TempDir::new().unwrap();
    let coordinator = SessionCoordinator::new(
        fast_config(&dir).with_drain_timeout(Duration::from_millis(80)),
    );

    let output = coordinator
        .run(&ContextPayload::new("r1", "asset"), |locators| async move {
            // One result, then the remote hangs without ever closing.
            remote_write(
                &locators.messages.0,
                &[r#"{"kind":"materialization","entity":"a","metadata":{}}"#],
            );
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(output.outcomes.len(), 1);
    assert!(matches!(output.error, Some(SessionError::Timeout { .. })));
}

#[tokio::test]
async fn channels_are_not_reused_across_sessions() {
    let dir = TempDir::new().unwrap();
    let coordinator =
        SessionCoordinator::new(fast_config(&dir).with_termination(Termination::Quiescence));
    let payload = ContextPayload::new("r1", "asset");

    let first = coordinator.open(&payload).unwrap();
    let second = coordinator.open(&payload).unwrap();

    assert_ne!(first.locators().context.0, second.locators().context.0);
    assert_ne!(first.locators().messages.0, second.locators().messages.0);
}
