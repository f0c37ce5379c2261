//! Line-oriented log streams.
//!
//! A log stream is the output-only degenerate case of an attach: bytes flow
//! from the remote side only, and each complete line is decoded into a
//! [`LogEntry`] and handed to a [`LogHandler`]. Handlers get the session's
//! cancellation token so they can end the stream themselves, which is how a
//! build log says "finished" as opposed to "connection lost".

use std::io;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::StreamError;

/// Source tag of lines written to the remote process's stderr
pub const ERROR_SOURCE: &str = "stderr";

/// Line sent on stderr once a build log has nothing more to say
pub const END_OF_STREAM: &str = "EOF";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// Process that produced the line (e.g. `web.1`)
    pub name: String,
    pub line: String,
    /// `stdout` or `stderr`
    pub source: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.source == ERROR_SOURCE
    }

    /// The end-of-stream marker of a build log
    pub fn is_end_of_stream(&self) -> bool {
        self.is_error() && self.line == END_OF_STREAM
    }

    /// Decode one line of the stream. Lines that are not JSON entries are
    /// passed through as plain output. Blank lines yield nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            return None;
        }
        if raw.trim_start().starts_with('{') {
            match serde_json::from_str(raw) {
                Ok(entry) => return Some(entry),
                Err(e) => trace!(error = %e, "Log line is not a JSON entry"),
            }
        }
        Some(Self {
            line: raw.to_string(),
            ..Self::default()
        })
    }
}

/// Consumer of a log stream, called once per line.
pub trait LogHandler: Send {
    /// Handle one entry. Cancelling `cancel` ends the stream cleanly after
    /// this call returns; an error ends it with that error.
    fn handle(&mut self, entry: &LogEntry, cancel: &CancellationToken) -> Result<(), StreamError>;
}

/// Drive `stream` to completion, feeding every line to `handler`.
///
/// Returns `Ok` when the stream ends or `cancel` fires, and the first error
/// from either the stream or the handler otherwise.
pub async fn follow_log_stream<S, B, E>(
    stream: S,
    handler: &mut dyn LogHandler,
    cancel: &CancellationToken,
) -> Result<(), StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut stream = std::pin::pin!(stream);
    let mut pending: Vec<u8> = Vec::new();
    let mut lines = 0usize;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(lines, "Log stream cancelled");
                return Ok(());
            }
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| StreamError::Remote(io::Error::other(e)))?;
        pending.extend_from_slice(chunk.as_ref());

        while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            lines += 1;
            if dispatch(&line[..line.len() - 1], handler, cancel)? {
                debug!(lines, "Log stream ended by handler");
                return Ok(());
            }
        }
    }

    // A final line without a trailing newline
    if !pending.is_empty() {
        lines += 1;
        dispatch(&pending, handler, cancel)?;
    }
    debug!(lines, "Log stream closed");
    Ok(())
}

/// Returns whether the handler cancelled the stream
fn dispatch(
    line: &[u8],
    handler: &mut dyn LogHandler,
    cancel: &CancellationToken,
) -> Result<bool, StreamError> {
    if let Some(entry) = LogEntry::parse(&String::from_utf8_lossy(line)) {
        handler.handle(&entry, cancel)?;
    }
    Ok(cancel.is_cancelled())
}
