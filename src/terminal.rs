//! Session-bound terminal state.
//!
//! Holds the append-only line log, the command recall buffer, and the
//! console mode. The mode is a tagged state that carries the session, so a
//! query can only start from [`Mode::Idle`] and the "is a query in flight"
//! check and the "may I submit" check are the same match.
//!
//! ```text
//! Uninitialized ──session ready──▶ Idle ──submit query──▶ Processing
//!                                   ▲                          │
//!                                   └──── success / failure ───┘
//! ```

use crate::error::SessionError;
use crate::history::CommandHistory;
use crate::models::{Session, TerminalLine};

pub const PROMPT_IDLE: &str = "genterm> ";
pub const PROMPT_PROCESSING: &str = "processing... ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// No session yet: built-ins work, queries are refused.
    Uninitialized,
    Idle { session: Session },
    Processing { session: Session },
}

#[derive(Debug, Clone)]
pub struct TerminalState {
    lines: Vec<TerminalLine>,
    history: CommandHistory,
    mode: Mode,
    /// Bumped by every `clear`, so renderers know to wipe the screen.
    clears: u64,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalState {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            history: CommandHistory::new(),
            mode: Mode::Uninitialized,
            clears: 0,
        }
    }

    pub fn lines(&self) -> &[TerminalLine] {
        &self.lines
    }

    pub fn push(&mut self, line: TerminalLine) {
        self.lines.push(line);
    }

    /// Empties the log. History and mode are untouched.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.clears += 1;
    }

    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.mode {
            Mode::Uninitialized => None,
            Mode::Idle { session } | Mode::Processing { session } => Some(session),
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.mode, Mode::Processing { .. })
    }

    pub fn prompt(&self) -> &'static str {
        if self.is_processing() {
            PROMPT_PROCESSING
        } else {
            PROMPT_IDLE
        }
    }

    /// Uninitialized → Idle. A second session replaces the first only when
    /// no query is in flight.
    pub fn session_ready(&mut self, session: Session) {
        if !self.is_processing() {
            self.mode = Mode::Idle { session };
        }
    }

    /// Idle → Processing. Returns the session the query runs under.
    ///
    /// Callers gate on [`is_processing`](Self::is_processing) first; from
    /// `Processing` this returns the running session unchanged.
    pub fn begin_query(&mut self) -> Result<Session, SessionError> {
        match &self.mode {
            Mode::Uninitialized => Err(SessionError::NoActiveSession),
            Mode::Idle { session } => {
                let session = session.clone();
                self.mode = Mode::Processing {
                    session: session.clone(),
                };
                Ok(session)
            }
            Mode::Processing { session } => Ok(session.clone()),
        }
    }

    /// Processing → Idle, unconditionally.
    pub fn end_query(&mut self) {
        if let Mode::Processing { session } = &self.mode {
            self.mode = Mode::Idle {
                session: session.clone(),
            };
        }
    }
}
