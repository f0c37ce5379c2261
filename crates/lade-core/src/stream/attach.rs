//! Bridging the local terminal to a remote process connection.
//!
//! One attach call owns the connection and the terminal for the lifetime of
//! the session:
//!
//! ```text
//! Created -> RawModeEntered -> Streaming -> ClosedClean | ClosedByError -> RestoredTerminal
//! ```
//!
//! The remote-to-local copy finishing is the normal end of a session (the
//! remote process exited). Local input reaching EOF closes the write side of
//! the connection so the remote process sees EOF too, and the session then
//! ends once the remote side closes. The terminal is restored on every way
//! out, including the attach future being dropped.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use super::resize::{spawn_resize_task, ResizeControl, ResizeEvents};
use super::terminal::{RawModeGuard, Terminal};
use super::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// stdin and stdout, terminal in raw mode, window size propagated
    Interactive,
    /// stdout only, terminal left alone
    OutputOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Created,
    RawModeEntered,
    Streaming,
    ClosedClean,
    ClosedByError,
    RestoredTerminal,
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Attacher {
    terminal: Arc<dyn Terminal>,
    resize: Option<Arc<dyn ResizeControl>>,
}

impl Attacher {
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self {
            terminal,
            resize: None,
        }
    }

    /// Propagate window size changes through `control` during interactive sessions
    pub fn with_resize(mut self, control: Arc<dyn ResizeControl>) -> Self {
        self.resize = Some(control);
        self
    }

    /// Run one session over `conn` until either side closes.
    pub async fn attach<C, I, O>(
        &self,
        conn: C,
        stdin: &mut I,
        stdout: &mut O,
        mode: AttachMode,
        events: ResizeEvents,
    ) -> Result<(), StreamError>
    where
        C: AsyncRead + AsyncWrite + Send,
        I: AsyncRead + Unpin + Send + ?Sized,
        O: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut state = AttachState::Created;

        if mode == AttachMode::OutputOnly {
            advance(&mut state, AttachState::Streaming);
            let (mut remote, _) = tokio::io::split(conn);
            let result = copy_output(&mut remote, stdout).await;
            advance(&mut state, closed_state(&result));
            return result;
        }

        let guard = RawModeGuard::acquire(&*self.terminal).map_err(StreamError::Terminal)?;
        advance(&mut state, AttachState::RawModeEntered);

        let resize_task = self.resize.as_ref().map(|control| {
            AbortOnDrop(spawn_resize_task(
                Arc::clone(control),
                Arc::clone(&self.terminal),
                events,
            ))
        });

        advance(&mut state, AttachState::Streaming);
        let result = stream_duplex(conn, stdin, stdout).await;
        advance(&mut state, closed_state(&result));

        drop(resize_task);
        let restored = guard.restore();
        advance(&mut state, AttachState::RestoredTerminal);

        result?;
        restored.map_err(StreamError::Terminal)
    }
}

fn advance(state: &mut AttachState, next: AttachState) {
    debug!(from = ?*state, to = ?next, "Attach state");
    *state = next;
}

fn closed_state(result: &Result<(), StreamError>) -> AttachState {
    match result {
        Ok(()) => AttachState::ClosedClean,
        Err(_) => AttachState::ClosedByError,
    }
}

/// EOF in the middle of a read is how a closed connection sometimes surfaces
fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

async fn copy_output<R, O>(remote: &mut R, stdout: &mut O) -> Result<(), StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
{
    let copied = async {
        let bytes = tokio::io::copy(remote, stdout).await?;
        stdout.flush().await?;
        Ok::<_, io::Error>(bytes)
    };
    match copied.await {
        Ok(bytes) => {
            debug!(bytes, "Remote stream closed");
            Ok(())
        }
        Err(e) if is_eof(&e) => Ok(()),
        Err(e) => Err(StreamError::Remote(e)),
    }
}

async fn stream_duplex<C, I, O>(conn: C, stdin: &mut I, stdout: &mut O) -> Result<(), StreamError>
where
    C: AsyncRead + AsyncWrite + Send,
    I: AsyncRead + Unpin + Send + ?Sized,
    O: AsyncWrite + Unpin + Send + ?Sized,
{
    let (mut remote_read, mut remote_write) = tokio::io::split(conn);

    let inbound = copy_output(&mut remote_read, stdout);
    let outbound = async {
        let copied = copy_input(stdin, &mut remote_write).await;
        // Let the remote process see EOF.
        if let Err(e) = remote_write.shutdown().await {
            debug!(error = %e, "Failed to close connection write side");
        }
        copied
    };
    tokio::pin!(inbound, outbound);

    let mut input_open = true;
    loop {
        tokio::select! {
            result = &mut inbound => return result,
            result = &mut outbound, if input_open => {
                input_open = false;
                match result {
                    Ok(bytes) => debug!(bytes, "Local input closed"),
                    Err(e) if is_eof(&e) => debug!("Local input closed"),
                    Err(e) => return Err(StreamError::Local(e)),
                }
            }
        }
    }
}

/// Forward input as it arrives. Keystrokes must not sit in a buffer waiting
/// for more, so every read is written and flushed straight away.
async fn copy_input<I, W>(stdin: &mut I, remote: &mut W) -> io::Result<u64>
where
    I: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; 4096];
    let mut total = 0u64;
    loop {
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        remote.write_all(&buf[..n]).await?;
        remote.flush().await?;
        total += n as u64;
    }
}
