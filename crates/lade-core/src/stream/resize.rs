//! Window-size propagation to a remote process.
//!
//! Resize requests travel over the API (the control channel), never over the
//! process connection itself, so they can run beside the data copy without
//! any ordering between the two.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiError;

use super::terminal::{Terminal, WindowSize};

/// Sends the local window size to the remote session
#[async_trait]
pub trait ResizeControl: Send + Sync {
    async fn resize(&self, size: WindowSize) -> Result<(), ApiError>;
}

/// Notifications that the local window size changed
pub struct ResizeEvents {
    inner: BoxStream<'static, ()>,
}

impl ResizeEvents {
    /// Window-change signals (SIGWINCH) delivered to this process
    pub fn from_signal() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::window_change()) {
                Ok(signals) => {
                    let inner = stream::unfold(signals, |mut signals| async move {
                        signals.recv().await.map(|()| ((), signals))
                    });
                    return Self { inner: inner.boxed() };
                }
                Err(e) => warn!(error = %e, "Failed to listen for window changes"),
            }
        }
        Self::none()
    }

    pub fn none() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    pub fn from_receiver(rx: mpsc::Receiver<()>) -> Self {
        let inner = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|()| ((), rx)) });
        Self { inner: inner.boxed() }
    }

    pub async fn next(&mut self) -> Option<()> {
        self.inner.next().await
    }
}

/// Send the current size now and again after every notification. Failures
/// are logged and otherwise ignored.
pub(crate) fn spawn_resize_task(
    control: Arc<dyn ResizeControl>,
    terminal: Arc<dyn Terminal>,
    mut events: ResizeEvents,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let size = terminal.window_size();
            match control.resize(size).await {
                Ok(()) => debug!(rows = size.rows, cols = size.cols, "Remote window resized"),
                Err(e) => debug!(error = %e, "Resize request failed"),
            }
            if events.next().await.is_none() {
                break;
            }
        }
    })
}
