//! # genterm CLI
//!
//! Interactive question answering over uploaded documents and images.
//!
//! ## Usage
//!
//! ```bash
//! genterm --config ./config/genterm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `genterm chat` | Interactive console |
//! | `genterm ask "<question>"` | Ask one question and print the answer |
//! | `genterm serve` | Run the session/chat backend |
//! | `genterm completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Start the backend against an OpenAI-compatible endpoint
//! LLM_API_KEY=sk-... genterm serve
//!
//! # Chat with two files preloaded and a drop directory watched
//! genterm chat --file notes.txt --file report.pdf --drop-dir ./drop
//!
//! # One-shot
//! genterm ask "what does the file say" --file notes.txt
//! ```

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use genterm::config::{self, LoggingConfig};
use genterm::{repl, server};

#[derive(Parser)]
#[command(
    name = "genterm",
    about = "genterm - terminal Q&A over your documents and images",
    version,
    long_about = "genterm lets you upload text files, PDFs and images and ask questions \
    about them. Questions are answered by an AI backend, with the uploaded material \
    attached as context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/genterm.toml`. A missing file means built-in
    /// defaults.
    #[arg(long, global = true, default_value = "./config/genterm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive console.
    ///
    /// On a terminal this is a line editor with history (Up/Down). With
    /// piped input every line is submitted in order.
    Chat {
        /// File to upload before the first prompt. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Directory polled for new uploads. Overrides `console.drop_dir`.
        #[arg(long)]
        drop_dir: Option<PathBuf>,
    },

    /// Ask a single question and print the answer on stdout.
    Ask {
        /// The question.
        question: String,

        /// File to attach as context. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },

    /// Run the session and chat HTTP backend.
    ///
    /// Binds to `[server].bind` (or `PORT`) and forwards questions to the
    /// OpenAI-compatible endpoint in `[llm]`.
    Serve,

    /// Print shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "genterm", &mut std::io::stdout());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    let interactive = matches!(cli.command, Commands::Chat { .. }) && repl::is_interactive();
    init_logging(&config.logging, interactive)?;

    match cli.command {
        Commands::Chat { files, drop_dir } => {
            repl::run_chat(&config, &files, drop_dir).await?;
        }
        Commands::Ask { question, files } => {
            if let Err(e) = repl::run_ask(&config, &question, &files).await {
                // Already formatted as the console would show it.
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over `logging.level`. Logs go to `logging.file` when
/// set, to a temp file under the raw-mode console, otherwise to stderr.
fn init_logging(logging: &LoggingConfig, interactive: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.destination(interactive) {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
