//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.
//! Every command prints JSON to stdout.

mod canonicalize;
mod extract;
mod mappings;
mod merge;
mod screen;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use listingscrape::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "listingscrape")]
#[command(about = "Property listing extraction and reconciliation")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: discovered listingscrape.{toml,yaml,json})
    #[arg(short, long, global = true, env = "LISTINGSCRAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a listing from a saved HTML page
    Extract {
        /// HTML file to extract from ("-" reads stdin)
        file: PathBuf,
        /// Mapping name
        #[arg(short, long)]
        mapping: String,
        /// URL the page was fetched from
        #[arg(short, long)]
        url: String,
        /// Print the raw extraction result instead of the sanitized, graded listing
        #[arg(long)]
        raw: bool,
    },

    /// Classify a URL before fetching it
    Screen {
        /// URL to classify
        url: String,
    },

    /// Print the canonical form and deduplication key of a URL
    Canonicalize {
        /// URL to normalize
        url: String,
        /// Keep trailing slashes on the path
        #[arg(long)]
        keep_trailing_slash: bool,
    },

    /// List available mappings
    Mappings,

    /// Merge an extracted property hash into a stored listing
    Merge {
        /// Stored listing JSON
        existing: PathBuf,
        /// Incoming property hash JSON
        incoming: PathBuf,
        /// Write the merged listing back to the existing file
        #[arg(short, long)]
        write: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions { config: cli.config };
    let settings = load_settings(&options).await?;

    match cli.command {
        Commands::Extract {
            file,
            mapping,
            url,
            raw,
        } => extract::cmd_extract(&settings, &file, &mapping, &url, raw),
        Commands::Screen { url } => screen::cmd_screen(&settings, &url),
        Commands::Canonicalize {
            url,
            keep_trailing_slash,
        } => canonicalize::cmd_canonicalize(&url, !keep_trailing_slash),
        Commands::Mappings => mappings::cmd_mappings(&settings),
        Commands::Merge {
            existing,
            incoming,
            write,
        } => merge::cmd_merge(&existing, &incoming, write),
    }
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
