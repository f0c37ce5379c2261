//! Attaching the local terminal to remote byte streams.
//!
//! - `terminal`: raw mode acquisition and window size
//! - `resize`: window-change notifications and the resize control channel
//! - `attach`: the duplex copy between terminal and a remote process
//! - `logs`: line-oriented log streams with per-line handlers

pub mod attach;
pub mod error;
pub mod logs;
pub mod resize;
pub mod terminal;

pub use attach::{AttachMode, AttachState, Attacher};
pub use error::StreamError;
pub use logs::{follow_log_stream, LogEntry, LogHandler};
pub use resize::{ResizeControl, ResizeEvents};
pub use terminal::{CrosstermTerminal, RawModeGuard, Terminal, WindowSize};
