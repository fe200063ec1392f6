//! CLI argument parsing using clap.

use std::path::PathBuf;

use clap::Parser;

use crate::core::{JobKind, Model};
use crate::logging::LogFormat;

/// Backlogsmith - turns a project proposal into a validated backlog
///
/// Runs one cancellable generation job: summary, features, roles, timeline
/// and a four-level backlog, printed as JSON. Press Ctrl-C to cancel.
#[derive(Parser, Debug)]
#[command(name = "backlogsmith", version, about, long_about = None)]
pub struct Args {
    /// Path to the proposal text file
    pub proposal_file: PathBuf,

    /// AI CLI backend (codex, claude, gemini); overrides settings
    #[arg(short, long)]
    pub model: Option<Model>,

    /// Job kind, selects timeout and retry budget (analysis, backlog)
    #[arg(short, long, default_value_t = JobKind::Backlog)]
    pub kind: JobKind,

    /// Identifier of the project the job belongs to
    #[arg(short, long, default_value = "proposal")]
    pub subject: String,

    /// Job timeout in seconds; defaults to the configured timeout for the kind
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Write the plan here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding `.backlogsmith/`; defaults to the working directory
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}
