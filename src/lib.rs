//! # genterm
//!
//! Terminal question answering over uploaded documents and images.
//!
//! Files are uploaded into a console session; each question is answered by
//! an AI backend with the uploaded material attached as context. The same
//! crate ships that backend (`genterm serve`).
//!
//! ## Architecture
//!
//! ```text
//!  input ──▶ command ──▶ console ──▶ extract ──▶ context ──▶ router ──▶ gateway ──▶ serve ──▶ LLM
//!              │           │          (per file,   (assemble)  (text or   (HTTP)    (axum)
//!              │           │           concurrent)             image)
//!              ▼           ▼
//!           built-ins   terminal (mode, log, history) ──▶ render
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Uploaded files, extraction results, terminal lines |
//! | [`command`] | Built-in commands vs. queries |
//! | [`history`] | Command recall buffer |
//! | [`terminal`] | Console mode and line log |
//! | [`extract`] | Per-file content extraction |
//! | [`context`] | Context assembly |
//! | [`router`] | Text vs. image query routing |
//! | [`gateway`] | Session and AI gateways (HTTP client) |
//! | [`console`] | Query orchestration |
//! | [`upload`] | Upload predicate, `--file` reading, drop directory |
//! | [`render`] | Terminal output |
//! | [`repl`] | Interactive, line-mode, and one-shot drivers |
//! | [`session`] | In-memory sessions for the backend |
//! | [`llm`] | OpenAI-compatible completions client |
//! | [`server`] | Backend HTTP server |

pub mod command;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod history;
pub mod llm;
pub mod models;
pub mod render;
pub mod repl;
pub mod router;
pub mod server;
pub mod session;
pub mod terminal;
pub mod upload;
