//! File-backed communication channels.
//!
//! A channel is a uniquely named file used for one-directional handoff
//! between the orchestrator and the remote process. The `ChannelStore`
//! owns allocation and cleanup; channels are never reused across sessions.

use crate::errors::ChannelError;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Role a channel plays within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Written once by the orchestrator, read by the remote process.
    Context,
    /// Appended to by the remote process, tailed by the orchestrator.
    Messages,
}

impl ChannelRole {
    fn file_stem(self) -> &'static str {
        match self {
            ChannelRole::Context => "context",
            ChannelRole::Messages => "messages",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// A file-backed channel allocated for one session.
#[derive(Debug, Clone)]
pub struct Channel {
    role: ChannelRole,
    path: PathBuf,
}

impl Channel {
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The opaque locator handed across the process boundary.
    pub fn locator(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Allocates and releases file-backed channels under one directory.
#[derive(Debug, Clone)]
pub struct ChannelStore {
    dir: PathBuf,
}

impl ChannelStore {
    /// Create a store rooted at `dir`, or the OS temp directory if `None`.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir: dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Allocate a fresh, uniquely named channel for `role`.
    ///
    /// The backing file is created empty so the reader side never races a
    /// missing file. Fails if the channel directory is unwritable.
    pub fn allocate(&self, role: ChannelRole) -> Result<Channel, ChannelError> {
        fs::create_dir_all(&self.dir).map_err(|source| ChannelError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let name = format!("pipes-{}-{}.jsonl", role.file_stem(), Uuid::new_v4());
        let path = self.dir.join(name);
        fs::File::create(&path).map_err(|source| ChannelError::Allocate {
            role,
            path: path.clone(),
            source,
        })?;

        tracing::debug!(role = %role, path = %path.display(), "allocated channel");
        Ok(Channel { role, path })
    }

    /// Delete the channel's backing file.
    ///
    /// Idempotent: a file already removed (by a prior release or by the
    /// remote side) is not an error. Other failures are logged, not fatal.
    pub fn release(&self, channel: &Channel) {
        match fs::remove_file(&channel.path) {
            Ok(()) => {
                tracing::debug!(role = %channel.role, path = %channel.path.display(), "released channel");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    role = %channel.role,
                    path = %channel.path.display(),
                    error = %err,
                    "failed to release channel"
                );
            }
        }
    }
}
