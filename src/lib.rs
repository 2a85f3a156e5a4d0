//! Handshake protocol for out-of-process pipeline executions.
//!
//! An orchestrator that cannot call a remote computation directly (here,
//! code running inside a database) still needs to hand it run identity and
//! collect structured results. This crate implements that handshake over
//! two file-backed channels:
//! - a **context channel** the orchestrator writes once and the remote
//!   process reads
//! - a **message channel** the remote process appends newline-delimited
//!   JSON records to and the orchestrator tails
//!
//! The trigger itself — the side-channel call that starts the remote
//! computation — stays with the caller; the session only hands it the two
//! channel locators as opaque strings.
//!
//! ## Usage
//!
//! ```no_run
//! use pipes_core::{ContextPayload, SessionConfig, SessionCoordinator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let coordinator = SessionCoordinator::new(SessionConfig::default());
//! let payload = ContextPayload::new("run-1", "pg_pipes_asset");
//!
//! let output = coordinator
//!     .run(&payload, |locators| async move {
//!         // e.g. `select pipes_session('<context>', '<messages>', ...)`
//!         invoke_database_trigger(&locators.context.0, &locators.messages.0).await
//!     })
//!     .await?;
//!
//! for outcome in &output.outcomes {
//!     println!("{outcome:?}");
//! }
//! # Ok(())
//! # }
//! # async fn invoke_database_trigger(_: &str, _: &str) -> anyhow::Result<()> { Ok(()) }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod errors;
pub mod message;
pub mod session;
pub mod translate;

pub use channel::{Channel, ChannelRole, ChannelStore};
pub use config::{SessionConfig, Termination};
pub use context::{ChannelLocator, ContextPayload};
pub use errors::{ChannelError, MalformedMessage, SessionError};
pub use message::{LogLevel, Message, MessageStream};
pub use session::{
    Session, SessionCoordinator, SessionLocators, SessionOutput, SessionState, SessionStats,
};
pub use translate::{CheckRecord, MaterializationRecord, Outcome, Translator};
