//! Local terminal control.
//!
//! Raw mode is process-wide state. `RawModeGuard` restores it when dropped,
//! and the exit handler restores it through `CrosstermTerminal` for a process
//! that is about to terminate mid-session. A shared flag makes sure the
//! original mode is restored exactly once whichever of the two gets there
//! first.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

/// Size used when the terminal size cannot be determined
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Whether this process currently holds the terminal in raw mode
static RAW_MODE_HELD: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

pub trait Terminal: Send + Sync {
    fn enter_raw(&self) -> io::Result<()>;
    fn restore(&self) -> io::Result<()>;
    fn size(&self) -> io::Result<WindowSize>;

    /// Current size, or 80x24 when it cannot be read
    fn window_size(&self) -> WindowSize {
        match self.size() {
            Ok(size) if size.rows > 0 && size.cols > 0 => size,
            Ok(_) => WindowSize::default(),
            Err(e) => {
                debug!(error = %e, "Could not read terminal size, using default");
                WindowSize::default()
            }
        }
    }
}

/// The process terminal, driven through crossterm
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl Terminal for CrosstermTerminal {
    fn enter_raw(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        RAW_MODE_HELD.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&self) -> io::Result<()> {
        if RAW_MODE_HELD.swap(false, Ordering::SeqCst) {
            crossterm::terminal::disable_raw_mode()?;
        }
        Ok(())
    }

    fn size(&self) -> io::Result<WindowSize> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(WindowSize { rows, cols })
    }
}

/// Holds a terminal in raw mode for as long as it lives
pub struct RawModeGuard<'a> {
    terminal: &'a dyn Terminal,
    restored: bool,
}

impl<'a> RawModeGuard<'a> {
    pub fn acquire(terminal: &'a dyn Terminal) -> io::Result<Self> {
        terminal.enter_raw()?;
        debug!("Terminal switched to raw mode");
        Ok(Self {
            terminal,
            restored: false,
        })
    }

    /// Restore now and report the result instead of only logging it
    pub fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        self.terminal.restore()
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if let Err(e) = self.terminal.restore() {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}
