//! Terminal output.
//!
//! Only latency lines go to stdout. Notices and status lines are written to
//! stderr, one line each.

use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::IsTerminal;
use std::io::Write;

use termcolor::Color;
use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::StandardStreamLock;
use termcolor::WriteColor;

/// The width status headers are right-aligned to.
pub const HEADER_WIDTH: usize = 10;

/// The terminal ui.
#[derive(Debug)]
pub struct Ui {
    stdout: StandardStream,
    stderr: StandardStream,
}

/// Turns `Auto` into `Never` if the stream isn't a terminal, termcolor only
/// checks the environment.
pub fn resolve_color<T: IsTerminal>(stream: T, choice: ColorChoice) -> ColorChoice {
    match choice {
        ColorChoice::Auto if !stream.is_terminal() => ColorChoice::Never,
        other => other,
    }
}

impl Ui {
    /// Creates a new ui with the given color choice for both streams.
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(resolve_color(io::stdout(), choice)),
            stderr: StandardStream::stderr(resolve_color(io::stderr(), choice)),
        }
    }

    /// Returns an exclusive lock to stdout.
    pub fn stdout(&self) -> StandardStreamLock<'_> {
        self.stdout.lock()
    }

    /// Returns an exclusive lock to stderr.
    pub fn stderr(&self) -> StandardStreamLock<'_> {
        self.stderr.lock()
    }

    /// Whether stderr, and thus the log output, is colored.
    pub fn supports_color(&self) -> bool {
        self.stderr.supports_color()
    }

    /// Writes an `error:` notice.
    pub fn error(&self, message: impl Display) -> io::Result<()> {
        notice(&mut self.stderr(), "error", Color::Red, message)
    }

    /// Writes a `warning:` notice.
    pub fn warn(&self, message: impl Display) -> io::Result<()> {
        notice(&mut self.stderr(), "warning", Color::Yellow, message)
    }

    /// Writes a `hint:` notice.
    pub fn hint(&self, message: impl Display) -> io::Result<()> {
        notice(&mut self.stderr(), "hint", Color::Cyan, message)
    }

    /// Resets and flushes both streams.
    pub fn flush(&self) -> io::Result<()> {
        for mut stream in [self.stdout(), self.stderr()] {
            stream.reset()?;
            stream.flush()?;
        }

        Ok(())
    }
}

/// Writes a single line notice like `error: <message>`.
pub fn notice<W: WriteColor>(
    w: &mut W,
    kind: &str,
    color: Color,
    message: impl Display,
) -> io::Result<()> {
    paint(w, &bold(Some(color)), format_args!("{kind}:"))?;
    writeln!(w, " {message}")
}

/// Starts a status line with a right-aligned header.
pub fn status<W: WriteColor>(w: &mut W, header: &str, color: Color) -> io::Result<()> {
    paint(
        w,
        &bold(Some(color)),
        format_args!("{header:>width$}", width = HEADER_WIDTH),
    )?;
    write!(w, " ")
}

/// Writes `args` with the given spec and resets the writer afterwards.
pub fn paint<W: WriteColor>(w: &mut W, spec: &ColorSpec, args: fmt::Arguments<'_>) -> io::Result<()> {
    w.set_color(spec)?;
    w.write_fmt(args)?;
    w.reset()
}

/// A bold spec with an optional foreground color.
pub fn bold(color: Option<Color>) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_bold(true).set_fg(color);
    spec
}

/// A plain foreground color spec.
pub fn fg(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec
}
