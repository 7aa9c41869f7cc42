//! Command-line arguments.

use std::path::PathBuf;

use archief_rag::MetadataDiscipline;
use clap::{Parser, Subcommand};

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "archief")]
#[command(version)]
#[command(about = "Ask questions about the Kasteel Amerongen archive", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Wait for the full answer instead of streaming it
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// How image paths and archive numbers are listed: deduplicated or positional
    #[arg(long, global = true)]
    pub discipline: Option<MetadataDiscipline>,

    /// Directory with system.txt, rephrase.hbs and answer.hbs overrides
    #[arg(long, global = true)]
    pub prompts: Option<PathBuf>,

    /// Log level or filter (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive conversation (default)
    Chat,

    /// Ask a single question without history
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Embed documents from a JSON or JSON Lines file and store them in the index
    Ingest {
        /// File with `{id?, content, meta}` records
        file: PathBuf,
    },
}

impl Cli {
    /// Apply the flags that override configuration.
    pub fn apply(&self, settings: &mut Settings) {
        if self.no_stream {
            settings.streaming = false;
        }
        if let Some(discipline) = self.discipline {
            settings.presentation.discipline = discipline;
        }
        if let Some(prompts) = &self.prompts {
            settings.prompts_dir = Some(prompts.clone());
        }
    }
}
