//! Terminal output for the console.
//!
//! A [`Renderer`] keeps a cursor into the console's line log and prints
//! only what was appended since the last [`sync`](Renderer::sync). A
//! `clear` in the log (seen through the clear counter) wipes the screen.

use crossterm::{cursor, queue, terminal};
use std::io::Write;

use crate::models::{LineKind, TerminalLine};
use crate::terminal::{TerminalState, PROMPT_IDLE};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// ANSI colors, `\r\n` line endings, prompt redraws. For raw mode.
    Raw,
    /// Colors but no prompt handling. For a cooked TTY.
    Color,
    /// Bare text. For pipes and files.
    Plain,
}

impl RenderMode {
    /// Color when stdout is a TTY, otherwise plain.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stdout) {
            RenderMode::Color
        } else {
            RenderMode::Plain
        }
    }

    fn colored(self) -> bool {
        !matches!(self, RenderMode::Plain)
    }
}

/// One log line as it appears on screen.
pub fn format_line(line: &TerminalLine, colored: bool) -> String {
    let (color, text) = match line.kind {
        LineKind::User => (CYAN, format!("{}{}", PROMPT_IDLE, line.text)),
        LineKind::Assistant => (GREEN, line.text.clone()),
        LineKind::Error => (RED, line.text.clone()),
        LineKind::System => (DIM, line.text.clone()),
    };
    if !colored || (line.kind == LineKind::System && text.is_empty()) {
        return text;
    }
    format!("{}{}{}", color, text, RESET)
}

pub struct Renderer<W: Write> {
    out: W,
    mode: RenderMode,
    printed: usize,
    clears: u64,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, mode: RenderMode) -> Self {
        Self {
            out,
            mode,
            printed: 0,
            clears: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints lines appended since the last call.
    pub fn sync(&mut self, state: &TerminalState) {
        if state.clear_count() != self.clears {
            self.clears = state.clear_count();
            self.printed = 0;
            if self.mode != RenderMode::Plain {
                queue!(
                    self.out,
                    terminal::Clear(terminal::ClearType::All),
                    cursor::MoveTo(0, 0)
                )
                .ok();
            }
        }

        let lines = state.lines();
        if self.printed > lines.len() {
            self.printed = lines.len();
        }
        if self.printed == lines.len() {
            self.out.flush().ok();
            return;
        }

        if self.mode == RenderMode::Raw {
            write!(self.out, "\r").ok();
            queue!(self.out, terminal::Clear(terminal::ClearType::CurrentLine)).ok();
        }

        let eol = if self.mode == RenderMode::Raw { "\r\n" } else { "\n" };
        for line in &lines[self.printed..] {
            let rendered = format_line(line, self.mode.colored());
            // Multi-line replies need their own carriage returns in raw mode.
            for part in rendered.split('\n') {
                write!(self.out, "{}{}", part, eol).ok();
            }
        }
        self.printed = lines.len();
        self.out.flush().ok();
    }

    /// Redraws the input row. Only meaningful in [`RenderMode::Raw`].
    pub fn draw_prompt(&mut self, prompt: &str, input: &str) {
        if self.mode != RenderMode::Raw {
            return;
        }
        write!(self.out, "\r").ok();
        queue!(self.out, terminal::Clear(terminal::ClearType::CurrentLine)).ok();
        write!(self.out, "{}{}", prompt, input).ok();
        self.out.flush().ok();
    }
}
