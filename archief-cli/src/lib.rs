//! # archief-cli
//!
//! Terminal presenter for the archive assistant.
//!
//! - `archief chat` (default): interactive conversation with streamed answers
//! - `archief ask <question>`: one question, no history
//! - `archief ingest <file>`: embed and store documents
//!
//! Settings come from `archief.toml` (or `--config`) and the environment;
//! `OPENAI_API_KEY`, `PINECONE_API_KEY` and `PINECONE_INDEX_HOST` are
//! required for anything that talks to the hosted services.

pub mod app;
pub mod cli;
pub mod ingest;
pub mod presenter;
pub mod repl;
pub mod settings;
pub mod telemetry;

pub use cli::{Cli, Command};
pub use settings::Settings;
