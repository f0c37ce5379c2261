//! Log printers handed to log streams.

use std::collections::HashMap;
use std::io::Write;

use crossterm::style::{Color, Stylize};
use lade_core::stream::{LogEntry, LogHandler, StreamError};
use tokio_util::sync::CancellationToken;

/// Colours cycled through for process name prefixes
const NAME_COLORS: [Color; 6] = [
    Color::Yellow,
    Color::Green,
    Color::Cyan,
    Color::Blue,
    Color::Magenta,
    Color::Red,
];

/// Prints each line as is
pub struct PlainLogPrinter<W> {
    out: W,
}

impl<W: Write + Send> PlainLogPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> LogHandler for PlainLogPrinter<W> {
    fn handle(&mut self, entry: &LogEntry, _cancel: &CancellationToken) -> Result<(), StreamError> {
        writeln!(self.out, "{}", entry.line).map_err(StreamError::Local)
    }
}

/// Prefixes each line with its process name, aligned and coloured per process
pub struct NamedLogPrinter<W> {
    out: W,
    width: usize,
    color: bool,
    prefixes: HashMap<String, String>,
}

impl<W: Write + Send> NamedLogPrinter<W> {
    /// `width` is the longest process type; `color` is off when not writing to a terminal
    pub fn new(out: W, width: usize, color: bool) -> Self {
        Self {
            out,
            width,
            color,
            prefixes: HashMap::new(),
        }
    }

    fn prefix(&mut self, name: &str) -> &str {
        let next = self.prefixes.len();
        let (width, color) = (self.width, self.color);
        self.prefixes.entry(name.to_string()).or_insert_with(|| {
            // Room for the ".N" process number suffix.
            let prefix = format!("{:<w$} | ", name, w = width + 2);
            if color {
                prefix.with(NAME_COLORS[next % NAME_COLORS.len()]).to_string()
            } else {
                prefix
            }
        })
    }
}

impl<W: Write + Send> LogHandler for NamedLogPrinter<W> {
    fn handle(&mut self, entry: &LogEntry, _cancel: &CancellationToken) -> Result<(), StreamError> {
        let prefix = self.prefix(&entry.name).to_string();
        writeln!(self.out, "{}{}", prefix, entry.line).map_err(StreamError::Local)
    }
}

/// Build output: ends at the end-of-stream marker, fails on any other stderr line
pub struct DeployLogPrinter<W> {
    out: W,
    finished: bool,
}

impl<W: Write + Send> DeployLogPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, finished: false }
    }

    /// Check the build actually finished once the stream is over. A log that
    /// closes without the end-of-stream marker lost its connection.
    pub fn finish(&self) -> Result<(), StreamError> {
        if self.finished {
            Ok(())
        } else {
            Err(StreamError::Failed("build log ended before the build finished".to_string()))
        }
    }
}

impl<W: Write + Send> LogHandler for DeployLogPrinter<W> {
    fn handle(&mut self, entry: &LogEntry, cancel: &CancellationToken) -> Result<(), StreamError> {
        if entry.is_end_of_stream() {
            self.finished = true;
            cancel.cancel();
            return Ok(());
        }
        if entry.is_error() {
            return Err(StreamError::Failed(entry.line.clone()));
        }
        writeln!(self.out, "{}", entry.line).map_err(StreamError::Local)
    }
}
