//! Tailing reader for the message channel.
//!
//! The remote process appends records incrementally, so the stream must
//! tolerate partial writes: only complete, newline-terminated records are
//! yielded; trailing bytes without a delimiter are buffered and re-checked
//! on the next poll. The stream never decides end-of-stream itself — the
//! channel being empty can mean "no data yet" just as well as "no more
//! data ever" — that call belongs to the session coordinator.

use crate::channel::Channel;
use crate::errors::{ChannelError, MalformedMessage};
use crate::message::{Message, truncate_record};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Longest raw-record prefix carried in a `MalformedMessage`.
const MAX_RAW_SNIPPET: usize = 256;

/// One decoded item of the stream: a message, or a record that failed to
/// decode (the stream continues past it).
pub type StreamItem = Result<Message, MalformedMessage>;

/// Lazy, ordered, single-consumer view of a message channel.
pub struct MessageStream {
    path: PathBuf,
    /// Byte offset of the next unread position in the channel file.
    offset: u64,
    /// Trailing bytes of an incomplete record.
    partial: Vec<u8>,
    /// Complete records decoded but not yet popped.
    pending: VecDeque<StreamItem>,
    /// 1-based count of complete records seen so far.
    records_seen: u64,
}

impl MessageStream {
    /// Open a stream over `channel`. Reads nothing until the first `fill`.
    pub fn open(channel: &Channel) -> Self {
        Self {
            path: channel.path().to_path_buf(),
            offset: 0,
            partial: Vec::new(),
            pending: VecDeque::new(),
            records_seen: 0,
        }
    }

    /// Pull newly appended bytes from the channel, decoding every complete
    /// record into the pending queue. Non-blocking.
    ///
    /// Returns `true` if any new bytes were read (complete or not); the
    /// coordinator uses this to drive its quiescence clock. A channel file
    /// that has gone missing reads as "no data yet".
    pub fn fill(&mut self) -> Result<bool, ChannelError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(ChannelError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let read = |file: &mut File, offset: u64| -> std::io::Result<Vec<u8>> {
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        };
        let buf = read(&mut file, self.offset).map_err(|source| ChannelError::Read {
            path: self.path.clone(),
            source,
        })?;

        if buf.is_empty() {
            return Ok(false);
        }
        self.offset += buf.len() as u64;
        self.partial.extend_from_slice(&buf);

        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let mut record: Vec<u8> = self.partial.drain(..=pos).collect();
            record.pop(); // delimiter
            if record.last() == Some(&b'\r') {
                record.pop();
            }
            if record.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.records_seen += 1;
            self.pending.push_back(Self::decode(&record, self.records_seen));
        }
        Ok(true)
    }

    /// Next decoded item, in emission order, if one is pending.
    pub fn pop(&mut self) -> Option<StreamItem> {
        self.pending.pop_front()
    }

    /// Whether an incomplete trailing record is currently buffered.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Discard any buffered partial record. Called at session close: a
    /// record that never reached its delimiter was never emitted.
    pub(crate) fn discard_partial(&mut self) {
        if !self.partial.is_empty() {
            tracing::trace!(
                path = %self.path.display(),
                bytes = self.partial.len(),
                "discarding incomplete trailing record"
            );
            self.partial.clear();
        }
    }

    fn decode(record: &[u8], line: u64) -> StreamItem {
        serde_json::from_slice::<Message>(record).map_err(|err| MalformedMessage {
            line,
            reason: err.to_string(),
            raw: truncate_record(&String::from_utf8_lossy(record), MAX_RAW_SNIPPET),
        })
    }
}
