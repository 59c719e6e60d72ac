//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `list`: List issues, active by default
//! - `show`: Show one issue
//! - `links`: Report broken links, self links and cycles
//! - `fix-links`: Remove broken and self links
//! - `blockers`: Show the unresolved blockers of an issue
//! - `search`: Full-text search
//! - `archive` / `unarchive`: Move an issue in or out of the archive
//! - `watch`: Print change events until interrupted
//!
//! # Global Flags
//!
//! - `--root`: Store root (default: current directory)
//! - `--config`: YAML configuration file
//! - `--json`: Output in JSON format
//!
//! # Example
//!
//! ```bash
//! quill --root issues list --status open
//! quill --root issues links
//! quill --root issues watch
//! ```

mod execute;
mod output;

use crate::id_generation::validate_id;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use output::OutputMode;

/// quill - markdown issue store
///
/// Each issue is a markdown file with a YAML header under the store root,
/// bucketed by the first character of its ID.
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Store root directory
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List issues
    ///
    /// Shows active issues sorted by ID. Use `--archived` to list the
    /// archive instead.
    List(ListArgs),

    /// Show an issue
    Show(IdArgs),

    /// Check every link in the store
    ///
    /// Reports references to missing issues, issues referencing themselves,
    /// and cycles among parent, blocking or blocked_by links.
    Links,

    /// Remove broken and self references
    FixLinks,

    /// Show the unresolved issues blocking an issue
    Blockers(IdArgs),

    /// Search titles, tags and bodies
    Search(SearchArgs),

    /// Move an issue into the archive
    Archive(IdArgs),

    /// Move an issue out of the archive
    Unarchive(IdArgs),

    /// Print change events until Ctrl-C
    Watch,
}

/// Arguments for the `list` command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Filter by status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by type
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// List archived issues instead of active ones
    #[arg(long)]
    pub archived: bool,
}

/// A single issue ID argument
#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Issue ID
    #[arg(value_parser = validate_issue_id)]
    pub id: String,
}

/// Arguments for the `search` command
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search terms
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Maximum number of results
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}

/// Validate an issue ID given on the command line.
pub fn validate_issue_id(s: &str) -> std::result::Result<String, String> {
    let s = s.trim();
    if validate_id(s) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "Invalid issue ID '{s}': use letters, digits, '-' and '_' without leading, trailing or doubled dashes"
        ))
    }
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        if self.no_color {
            colored::control::set_override(false);
        }
        let mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let store = execute::open_store(&self.root, self.config.as_deref()).await?;
        match &self.command {
            Commands::List(args) => execute::list(&store, args, mode).await,
            Commands::Show(args) => execute::show(&store, &args.id, mode).await,
            Commands::Links => execute::links(&store, mode).await,
            Commands::FixLinks => execute::fix_links(&store, mode).await,
            Commands::Blockers(args) => execute::blockers(&store, &args.id, mode).await,
            Commands::Search(args) => execute::search(&store, args, mode).await,
            Commands::Archive(args) => execute::archive(&store, &args.id, true, mode).await,
            Commands::Unarchive(args) => execute::archive(&store, &args.id, false, mode).await,
            Commands::Watch => execute::watch(&store, mode).await,
        }
    }
}
