//! Terminal prompts.
//!
//! On a terminal, answers are read key by key with the terminal in raw mode,
//! so Ctrl+C reaches the prompt as a key instead of killing the process with
//! echo still switched off. It ends the prompt as an `Interrupted` error.
//! Everything here blocks; async callers go through [`ask`], which runs the
//! prompt on the blocking pool.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use lade_core::auth::Prompter;
use lade_core::stream::{CrosstermTerminal, RawModeGuard};

/// Somewhere prompt answers are read from
pub trait LineSource {
    /// Show `prompt` and read one answer, hiding the typed text unless `echo`
    fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String>;

    /// Show a message between prompts
    fn notice(&mut self, message: &str) -> io::Result<()>;
}

/// Line-buffered input, for stdin that is not a terminal
pub struct BufferedSource<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> BufferedSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> LineSource for BufferedSource<R, W> {
    fn read_line(&mut self, prompt: &str, _echo: bool) -> io::Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(interrupted("input closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message)
    }
}

/// Key-by-key input from a terminal already in raw mode
pub struct KeySource<E, W> {
    next_event: E,
    output: W,
}

impl<E, W> KeySource<E, W>
where
    E: FnMut() -> io::Result<Event>,
    W: Write,
{
    pub fn new(next_event: E, output: W) -> Self {
        Self { next_event, output }
    }
}

impl<E, W> LineSource for KeySource<E, W>
where
    E: FnMut() -> io::Result<Event>,
    W: Write,
{
    fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        loop {
            let Event::Key(key) = (self.next_event)()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Char('c') if ctrl => {
                    write!(self.output, "^C\r\n")?;
                    self.output.flush()?;
                    return Err(interrupted("interrupted"));
                }
                KeyCode::Char('d') if ctrl && line.is_empty() => {
                    write!(self.output, "\r\n")?;
                    self.output.flush()?;
                    return Err(interrupted("input closed"));
                }
                KeyCode::Enter => {
                    // Raw mode: no newline translation.
                    write!(self.output, "\r\n")?;
                    self.output.flush()?;
                    return Ok(line);
                }
                KeyCode::Backspace => {
                    if line.pop().is_some() && echo {
                        write!(self.output, "\x08 \x08")?;
                    }
                }
                KeyCode::Char(c) if !ctrl => {
                    line.push(c);
                    if echo {
                        write!(self.output, "{}", c)?;
                    }
                }
                _ => {}
            }
            self.output.flush()?;
        }
    }

    fn notice(&mut self, message: &str) -> io::Result<()> {
        write!(self.output, "{}\r\n", message)
    }
}

/// The process's own stdin and stdout
pub struct TerminalSource;

impl LineSource for TerminalSource {
    fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return BufferedSource::new(stdin.lock(), io::stdout()).read_line(prompt, echo);
        }
        let terminal = CrosstermTerminal;
        let guard = RawModeGuard::acquire(&terminal)?;
        let answer = KeySource::new(event::read, io::stdout()).read_line(prompt, echo);
        guard.restore()?;
        answer
    }

    fn notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(io::stdout(), "{}", message)
    }
}

fn interrupted(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, reason.to_string())
}

/// Login prompts read from a [`LineSource`], with the password hidden
pub struct LinePrompter<S> {
    source: Mutex<S>,
}

impl<S: LineSource> LinePrompter<S> {
    pub fn new(source: S) -> Self {
        Self { source: Mutex::new(source) }
    }

    fn read(&self, prompt: &str, echo: bool) -> io::Result<String> {
        let mut source = self.source.lock().map_err(|_| io::Error::other("prompt source poisoned"))?;
        source.read_line(prompt, echo)
    }
}

impl<S: LineSource + Send> Prompter for LinePrompter<S> {
    fn announce(&self, message: &str) {
        println!("{}", message);
    }

    fn ask_username(&self) -> io::Result<String> {
        self.read("Username or email: ", true)
    }

    fn ask_password(&self) -> io::Result<String> {
        self.read("Password: ", false)
    }
}

/// Default answer offered by a prompt
pub enum PromptDefault {
    Literal(String),
    /// Worked out only when the prompt is actually shown
    Computed(Box<dyn Fn() -> Option<String> + Send>),
    None,
}

impl PromptDefault {
    /// Name of the current directory, the usual app name
    pub fn current_dir_name() -> Self {
        Self::Computed(Box::new(|| {
            let dir = std::env::current_dir().ok()?;
            dir.file_name().map(|name| name.to_string_lossy().into_owned())
        }))
    }

    pub fn resolve(&self) -> Option<String> {
        let value = match self {
            Self::Literal(value) => Some(value.clone()),
            Self::Computed(compute) => compute(),
            Self::None => None,
        };
        value.filter(|value| !value.is_empty())
    }
}

/// Use `current` if the flag was given, otherwise ask on the terminal.
pub async fn ask(message: &'static str, current: Option<String>, default: PromptDefault) -> io::Result<String> {
    if let Some(value) = current.filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }
    tokio::task::spawn_blocking(move || ask_input(&mut TerminalSource, message, &default))
        .await
        .map_err(io::Error::other)?
}

/// Ask until a non-empty answer is given. An empty answer takes the default.
pub fn ask_input<S: LineSource>(source: &mut S, message: &str, default: &PromptDefault) -> io::Result<String> {
    let default = default.resolve();
    let prompt = match &default {
        Some(value) => format!("{} ({}) ", message, value),
        None => format!("{} ", message),
    };
    loop {
        let answer = source.read_line(&prompt, true)?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        if let Some(value) = &default {
            return Ok(value.clone());
        }
        source.notice("Value is required")?;
    }
}
