//! Console drivers.
//!
//! - [`run_chat`] picks the raw-mode editor on a TTY and the line-mode
//!   reader otherwise.
//! - [`run_lines`] submits each input line in order, awaiting every query.
//! - [`ask`] runs a single question through the same pipeline.
//!
//! The raw-mode loop multiplexes key events, the in-flight query, its
//! progress lines, and drop-directory polling in one `tokio::select!`. The
//! console itself is only touched from the loop body, never from the
//! spawned query task.

use anyhow::{bail, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, terminal};
use futures::StreamExt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::config::Config;
use crate::console::{Console, QueryJob, Submission};
use crate::error::ConsoleError;
use crate::gateway::{AiGateway, HttpGateway, SessionGateway};
use crate::models::{LineKind, TerminalLine, UploadedFile};
use crate::render::{RenderMode, Renderer};
use crate::upload::{read_paths, DropDirectory};

type QueryHandle = JoinHandle<Result<String, ConsoleError>>;

/// Entry point for `genterm chat`.
pub async fn run_chat(config: &Config, files: &[PathBuf], drop_dir: Option<PathBuf>) -> Result<()> {
    let gateway = HttpGateway::new(&config.gateway)?;
    let initial = read_paths(files).await?;

    let drop_dir = drop_dir.or_else(|| config.console.drop_dir.clone());
    let drop = match drop_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "watching drop directory");
            Some(DropDirectory::new(dir, &config.console.exclude_globs)?)
        }
        None => None,
    };

    let mut console = Console::with_banner(config.gateway.query_timeout());
    // A failed session is reported in the log; built-ins keep working.
    let _ = console.connect(&gateway).await;
    console.upload(initial);

    let poll = Duration::from_millis(config.console.poll_interval_ms);
    if is_interactive() {
        run_raw(&mut console, Arc::new(gateway), drop, poll).await
    } else {
        let reader = BufReader::new(tokio::io::stdin());
        let mut out = Renderer::new(io::stdout(), RenderMode::default_for_tty());
        run_lines(&mut console, &gateway, drop, reader, &mut out).await
    }
}

/// Whether `chat` will run the raw-mode editor.
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

/// Reads lines until EOF, submitting each one and awaiting its query.
pub async fn run_lines<R, W>(
    console: &mut Console,
    gateway: &dyn AiGateway,
    mut drop: Option<DropDirectory>,
    reader: R,
    out: &mut Renderer<W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    out.sync(console.state());
    while let Some(line) = lines.next_line().await? {
        if let Some(drop) = drop.as_mut() {
            console.upload(drop.scan());
        }
        console.submit(&line, gateway).await;
        out.sync(console.state());
    }
    Ok(())
}

/// One-shot question. Returns the assistant response, or the error the
/// console would have shown.
pub async fn ask(
    sessions: &dyn SessionGateway,
    gateway: &dyn AiGateway,
    question: &str,
    files: Vec<UploadedFile>,
    timeout: Duration,
) -> Result<String> {
    let mut console = Console::new(timeout);
    console.connect(sessions).await?;
    console.upload(files);

    if !matches!(console.submit(question, gateway).await, Submission::Query(_)) {
        bail!("Nothing to ask");
    }
    match console.lines().last() {
        Some(line) if line.kind == LineKind::Assistant => Ok(line.text.clone()),
        Some(line) => bail!("{}", line.text),
        None => bail!("No response"),
    }
}

/// Entry point for `genterm ask`.
pub async fn run_ask(config: &Config, question: &str, files: &[PathBuf]) -> Result<()> {
    let gateway = HttpGateway::new(&config.gateway)?;
    let files = read_paths(files).await?;
    let response = ask(
        &gateway,
        &gateway,
        question,
        files,
        config.gateway.query_timeout(),
    )
    .await?;
    println!("{}", response);
    Ok(())
}

// ============ Raw mode ============

/// What the raw-mode loop must do after a key press.
#[derive(Debug)]
enum KeyAction {
    Continue,
    Exit,
    /// The running query was cancelled; its task must be aborted.
    Cancel,
    Spawn(QueryJob),
}

async fn run_raw(
    console: &mut Console,
    gateway: Arc<dyn AiGateway>,
    drop: Option<DropDirectory>,
    poll: Duration,
) -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(io::stdout(), cursor::Show);
        default_panic(info);
    }));

    terminal::enable_raw_mode()?;
    let result = raw_loop(console, gateway, drop, poll).await;

    terminal::disable_raw_mode()?;
    execute!(io::stdout(), cursor::Show)?;
    result
}

async fn raw_loop(
    console: &mut Console,
    gateway: Arc<dyn AiGateway>,
    mut drop: Option<DropDirectory>,
    poll: Duration,
) -> Result<()> {
    let mut out = Renderer::new(io::stdout(), RenderMode::Raw);
    let mut events = EventStream::new();
    let mut input = String::new();
    // Each query gets its own channel. Dropping the receiver on cancel
    // makes late sends from an aborted task fail instead of landing here.
    let mut progress_rx = closed_progress();
    let mut in_flight: Option<QueryHandle> = None;

    let mut tick = tokio::time::interval(poll);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    out.sync(console.state());
    out.draw_prompt(console.prompt(), &input);

    loop {
        tokio::select! {
            maybe_event = events.next() => {
                let Some(Ok(event)) = maybe_event else {
                    break;
                };
                let Event::Key(key) = event else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match apply_key(key, console, &mut input) {
                    KeyAction::Continue => {}
                    KeyAction::Exit => {
                        write!(io::stdout(), "\r\n").ok();
                        break;
                    }
                    KeyAction::Cancel => {
                        if let Some(handle) = in_flight.take() {
                            handle.abort();
                        }
                        progress_rx = closed_progress();
                    }
                    KeyAction::Spawn(job) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        progress_rx = rx;
                        in_flight = Some(spawn_query(job, Arc::clone(&gateway), tx));
                    }
                }
            }
            Some(line) = progress_rx.recv() => {
                console.push_line(line);
            }
            joined = join_query(&mut in_flight) => {
                in_flight = None;
                while let Ok(line) = progress_rx.try_recv() {
                    console.push_line(line);
                }
                console.complete(flatten_join(joined));
            }
            _ = tick.tick(), if drop.is_some() => {
                if let Some(drop) = drop.as_mut() {
                    console.upload(drop.scan());
                }
            }
        }

        out.sync(console.state());
        out.draw_prompt(console.prompt(), &input);
    }

    if let Some(handle) = in_flight {
        handle.abort();
    }
    Ok(())
}

/// A receiver with no sender; `recv` yields `None` at once.
fn closed_progress() -> mpsc::UnboundedReceiver<TerminalLine> {
    mpsc::unbounded_channel().1
}

/// Maps a key press onto the console and the input buffer.
///
/// While a query runs, only Esc and Ctrl-C do anything: both cancel it.
/// When idle, Ctrl-C exits and Ctrl-D exits on an empty line.
fn apply_key(key: KeyEvent, console: &mut Console, input: &mut String) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if console.is_processing() {
        let cancel = key.code == KeyCode::Esc || (ctrl && key.code == KeyCode::Char('c'));
        if cancel {
            console.cancel();
            return KeyAction::Cancel;
        }
        return KeyAction::Continue;
    }

    match key.code {
        KeyCode::Char('c') if ctrl => return KeyAction::Exit,
        KeyCode::Char('d') if ctrl => {
            if input.is_empty() {
                return KeyAction::Exit;
            }
        }
        KeyCode::Enter => {
            let raw = std::mem::take(input);
            if let Submission::Query(job) = console.accept(&raw) {
                return KeyAction::Spawn(job);
            }
        }
        KeyCode::Up => {
            if let Some(entry) = console.recall_older(input) {
                *input = entry;
            }
        }
        KeyCode::Down => {
            if let Some(entry) = console.recall_newer() {
                *input = entry;
            }
        }
        KeyCode::Backspace => {
            input.pop();
        }
        KeyCode::Char(c) if !ctrl => input.push(c),
        _ => {}
    }
    KeyAction::Continue
}

fn spawn_query(
    job: QueryJob,
    gateway: Arc<dyn AiGateway>,
    progress: mpsc::UnboundedSender<TerminalLine>,
) -> QueryHandle {
    tokio::spawn(async move { job.run(gateway.as_ref(), &progress).await })
}

async fn join_query(
    in_flight: &mut Option<QueryHandle>,
) -> Result<Result<String, ConsoleError>, JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn flatten_join(
    joined: Result<Result<String, ConsoleError>, JoinError>,
) -> Result<String, ConsoleError> {
    match joined {
        Ok(outcome) => outcome,
        // Aborts are handled at the key press; anything else is a panic.
        Err(e) if e.is_cancelled() => Err(ConsoleError::Cancelled),
        Err(e) => {
            tracing::error!(error = %e, "query task panicked");
            Err(ConsoleError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn idle_console() -> Console {
        let mut console = Console::new(Duration::from_secs(5));
        console.attach_session(Session {
            id: "s-1".to_string(),
        });
        console
    }

    fn type_line(console: &mut Console, input: &mut String, text: &str) -> KeyAction {
        for c in text.chars() {
            apply_key(press(KeyCode::Char(c)), console, input);
        }
        apply_key(press(KeyCode::Enter), console, input)
    }

    #[test]
    fn enter_on_a_question_spawns_a_job() {
        let mut console = idle_console();
        let mut input = String::new();

        match type_line(&mut console, &mut input, "what is 2+2") {
            KeyAction::Spawn(job) => assert_eq!(job.query, "what is 2+2"),
            other => panic!("expected a job, got {:?}", other),
        }
        assert!(input.is_empty());
        assert!(console.is_processing());
    }

    #[test]
    fn enter_on_a_builtin_stays_idle() {
        let mut console = idle_console();
        let mut input = String::new();

        assert!(matches!(type_line(&mut console, &mut input, "files"), KeyAction::Continue));
        assert!(!console.is_processing());
        assert_eq!(console.lines().last().unwrap().text, "No files uploaded.");
    }

    #[test]
    fn esc_and_ctrl_c_cancel_a_running_query() {
        for key in [press(KeyCode::Esc), ctrl('c')] {
            let mut console = idle_console();
            let mut input = String::new();
            type_line(&mut console, &mut input, "slow question");

            assert!(matches!(apply_key(key, &mut console, &mut input), KeyAction::Cancel));
            assert!(!console.is_processing());
            assert_eq!(console.lines().last().unwrap().text, "Query cancelled.");
        }
    }

    #[test]
    fn other_keys_are_ignored_while_processing() {
        let mut console = idle_console();
        let mut input = String::new();
        type_line(&mut console, &mut input, "slow question");

        for key in [press(KeyCode::Char('x')), press(KeyCode::Up), ctrl('d')] {
            assert!(matches!(apply_key(key, &mut console, &mut input), KeyAction::Continue));
        }
        assert!(input.is_empty());
        assert!(console.is_processing());
    }

    #[test]
    fn ctrl_c_exits_when_idle() {
        let mut console = idle_console();
        let mut input = String::from("half typed");
        assert!(matches!(apply_key(ctrl('c'), &mut console, &mut input), KeyAction::Exit));
    }

    #[test]
    fn ctrl_d_exits_only_on_an_empty_line() {
        let mut console = idle_console();
        let mut input = String::from("x");
        assert!(matches!(apply_key(ctrl('d'), &mut console, &mut input), KeyAction::Continue));
        assert_eq!(input, "x");

        apply_key(press(KeyCode::Backspace), &mut console, &mut input);
        assert!(input.is_empty());
        assert!(matches!(apply_key(ctrl('d'), &mut console, &mut input), KeyAction::Exit));
    }

    #[test]
    fn up_and_down_recall_history() {
        let mut console = idle_console();
        let mut input = String::new();
        type_line(&mut console, &mut input, "help");
        type_line(&mut console, &mut input, "files");

        input.push_str("dra");
        apply_key(press(KeyCode::Up), &mut console, &mut input);
        assert_eq!(input, "files");
        apply_key(press(KeyCode::Up), &mut console, &mut input);
        assert_eq!(input, "help");
        apply_key(press(KeyCode::Down), &mut console, &mut input);
        assert_eq!(input, "files");
        apply_key(press(KeyCode::Down), &mut console, &mut input);
        assert_eq!(input, "dra");
    }

    #[tokio::test]
    async fn replaced_receiver_shuts_out_the_old_job() {
        let (tx, rx) = mpsc::unbounded_channel::<TerminalLine>();
        let mut progress_rx = rx;
        tx.send(TerminalLine::system("Thinking...")).unwrap();
        assert!(progress_rx.try_recv().is_ok());

        progress_rx = closed_progress();
        assert!(tx.send(TerminalLine::system("Thinking...")).is_err());
        assert!(progress_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn join_without_query_never_resolves() {
        let mut none: Option<QueryHandle> = None;
        let joined = tokio::time::timeout(Duration::from_millis(20), join_query(&mut none)).await;
        assert!(joined.is_err());
    }

    #[tokio::test]
    async fn aborted_task_maps_to_cancelled() {
        let handle: QueryHandle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        });
        handle.abort();
        let mut slot = Some(handle);
        let outcome = flatten_join(join_query(&mut slot).await);
        assert!(matches!(outcome, Err(ConsoleError::Cancelled)));
    }
}
