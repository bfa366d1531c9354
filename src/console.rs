//! Query orchestration.
//!
//! [`Console`] owns the terminal state and the uploaded-file list. Input is
//! handled in two halves so a driver can keep reading keys while a query
//! is in flight:
//!
//! 1. [`Console::accept`] runs synchronously: it applies the processing
//!    gate, echoes the input, records history, executes built-ins, and for
//!    a query enters `Processing` and hands back a [`QueryJob`].
//! 2. [`QueryJob::run`] owns a snapshot of the files and borrows nothing
//!    from the console. Its outcome goes back through
//!    [`Console::complete`], which always returns the console to `Idle`.
//!
//! [`Console::submit`] chains both halves for drivers that don't need to
//! interleave input with a running query.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::command::{help_lines, interpret, Action};
use crate::context::{assemble, context_list};
use crate::error::{ConsoleError, QueryError, SessionError};
use crate::extract::extract_all;
use crate::gateway::{AiGateway, ChatRequest, SessionGateway};
use crate::models::{format_file_size, Session, TerminalLine, UploadedFile};
use crate::router::{encode_image, image_data_url, route, RouteDecision};
use crate::terminal::TerminalState;

/// Lines a running query reports before its outcome is known.
pub type ProgressSender = mpsc::UnboundedSender<TerminalLine>;

/// What [`Console::accept`] did with a line of input.
#[derive(Debug)]
pub enum Submission {
    /// Refused by the processing gate, or blank.
    Ignored,
    /// Handled locally (built-in, or a query refused for lack of a session).
    Handled,
    /// A query to run; the console is now `Processing`.
    Query(QueryJob),
}

pub struct Console {
    state: TerminalState,
    files: Vec<UploadedFile>,
    query_timeout: Duration,
}

impl Console {
    pub fn new(query_timeout: Duration) -> Self {
        Self {
            state: TerminalState::new(),
            files: Vec::new(),
            query_timeout,
        }
    }

    /// Console with the startup banner already in the log.
    pub fn with_banner(query_timeout: Duration) -> Self {
        let mut console = Self::new(query_timeout);
        for line in banner_lines() {
            console.state.push(TerminalLine::system(line));
        }
        console
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn lines(&self) -> &[TerminalLine] {
        self.state.lines()
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }

    pub fn prompt(&self) -> &'static str {
        self.state.prompt()
    }

    pub fn push_line(&mut self, line: TerminalLine) {
        self.state.push(line);
    }

    /// Creates the session and moves the console to `Idle`. On failure the
    /// console stays `Uninitialized` and the error is shown.
    pub async fn connect(&mut self, gateway: &dyn SessionGateway) -> Result<(), SessionError> {
        match gateway.create_session().await {
            Ok(session) => {
                tracing::info!(session = %session.id, "session connected");
                self.attach_session(session);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to create session");
                self.state.push(TerminalLine::error(format!(
                    "Failed to create session: {}. Restart genterm to retry.",
                    e
                )));
                Err(e)
            }
        }
    }

    pub fn attach_session(&mut self, session: Session) {
        self.state
            .push(TerminalLine::system(format!("Session connected: {}", session.id)));
        self.state.session_ready(session);
    }

    /// Appends an accepted upload batch. Allowed in every mode; a query
    /// already running keeps the file list it started with.
    pub fn upload(&mut self, batch: Vec<UploadedFile>) {
        if batch.is_empty() {
            return;
        }
        self.state.push(TerminalLine::system(format!(
            "Uploaded {} file(s):",
            batch.len()
        )));
        for file in &batch {
            self.state.push(TerminalLine::system(format!(
                " - {} ({})",
                file.name,
                format_file_size(file.size)
            )));
        }
        self.files.extend(batch);
    }

    /// History recall toward older entries. Disabled while processing.
    pub fn recall_older(&mut self, live: &str) -> Option<String> {
        if self.is_processing() {
            return None;
        }
        self.state.history_mut().older(live)
    }

    /// History recall toward newer entries. Disabled while processing.
    pub fn recall_newer(&mut self) -> Option<String> {
        if self.is_processing() {
            return None;
        }
        self.state.history_mut().newer()
    }

    pub fn accept(&mut self, raw: &str) -> Submission {
        if self.is_processing() {
            return Submission::Ignored;
        }

        let action = interpret(raw);
        if action == Action::NoOp {
            return Submission::Ignored;
        }

        let command = raw.trim();
        self.state.push(TerminalLine::user(command));
        self.state.history_mut().push(command);

        match action {
            Action::NoOp => Submission::Ignored,
            Action::ClearTerminal => {
                self.state.clear();
                Submission::Handled
            }
            Action::ShowHelp => {
                for line in help_lines() {
                    self.state.push(TerminalLine::system(line));
                }
                Submission::Handled
            }
            Action::ListFiles => {
                self.list_files();
                Submission::Handled
            }
            Action::SubmitQuery(query) => self.start_query(query),
        }
    }

    fn list_files(&mut self) {
        if self.files.is_empty() {
            self.state.push(TerminalLine::system("No files uploaded."));
            return;
        }
        self.state.push(TerminalLine::system("Uploaded Files:"));
        let lines: Vec<_> = self
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {} ({})", i + 1, f.name, format_file_size(f.size)))
            .collect();
        for line in lines {
            self.state.push(TerminalLine::system(line));
        }
    }

    fn start_query(&mut self, query: String) -> Submission {
        let session = match self.state.begin_query() {
            Ok(session) => session,
            Err(e) => {
                self.state.push(TerminalLine::error(e.to_string()));
                return Submission::Handled;
            }
        };
        self.state.push(TerminalLine::system(format!(
            "Processing query... {} files in context.",
            self.files.len()
        )));
        Submission::Query(QueryJob {
            session,
            query,
            files: self.files.clone(),
            timeout: self.query_timeout,
        })
    }

    /// Records the outcome of a [`QueryJob`] and returns to `Idle`.
    pub fn complete(&mut self, outcome: Result<String, ConsoleError>) {
        match outcome {
            Ok(response) => {
                self.state.push(TerminalLine::system("AI Response:"));
                self.state.push(TerminalLine::system("------------"));
                self.state.push(TerminalLine::assistant(response));
            }
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                self.state.push(TerminalLine::error(format!("Error: {}", e)));
            }
        }
        self.state.end_query();
    }

    /// Abandons the running query. No-op when idle.
    pub fn cancel(&mut self) {
        if self.is_processing() {
            self.state.push(TerminalLine::error(ConsoleError::Cancelled.to_string()));
            self.state.end_query();
        }
    }

    /// Accepts `raw` and, for a query, runs it to completion inline.
    pub async fn submit(&mut self, raw: &str, gateway: &dyn AiGateway) -> Submission {
        let job = match self.accept(raw) {
            Submission::Query(job) => job,
            other => return other,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = job.clone().run(gateway, &tx).await;
        drop(tx);
        while let Ok(line) = rx.try_recv() {
            self.state.push(line);
        }
        self.complete(outcome);
        Submission::Query(job)
    }
}

/// A query detached from the console: session, text, and the file list as
/// it was when the query was submitted.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub session: Session,
    pub query: String,
    pub files: Vec<UploadedFile>,
    pub timeout: Duration,
}

impl QueryJob {
    /// Extract, assemble, route, and call the gateway.
    pub async fn run(
        self,
        gateway: &dyn AiGateway,
        progress: &ProgressSender,
    ) -> Result<String, ConsoleError> {
        let results = extract_all(&self.files).await;
        let context = context_list(&assemble(&results));

        let request = match route(&self.query, &self.files) {
            RouteDecision::ImageQuery(image) => {
                report(progress, format!("Processing image: {}...", image.name));
                let payload = encode_image(&image)?;
                report(progress, "Analyzing image...");
                ChatRequest::image(
                    &self.session.id,
                    &self.query,
                    context,
                    image_data_url(&payload),
                )
            }
            RouteDecision::TextQuery => {
                report(progress, "Thinking...");
                ChatRequest::text(&self.session.id, &self.query, context)
            }
        };

        tracing::debug!(
            session = %self.session.id,
            files = self.files.len(),
            image = request.has_image(),
            "sending query"
        );

        let reply = tokio::time::timeout(self.timeout, gateway.chat(&request))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;
        Ok(reply.response)
    }
}

fn report(progress: &ProgressSender, text: impl Into<String>) {
    // The receiver only goes away when the driver has already given up on
    // this query.
    let _ = progress.send(TerminalLine::system(text));
}

pub fn banner_lines() -> Vec<&'static str> {
    vec![
        "Welcome to genterm - terminal RAG Q&A",
        "----------------------------------------",
        "Upload files with --file or by dropping them into the drop directory.",
        "Type your question and press Enter to ask.",
        "Type \"clear\" to clear the terminal.",
        "Type \"files\" to see uploaded files.",
        "Type \"help\" to display this list of commands.",
    ]
}
