//! # Journal CLI
//!
//! Command-line interface for browsing Sugar journal entries on removable
//! media and remote shares.
//!
//! ## Commands
//!
//! - `journal query <mount point>` - List the entries of a mount point
//! - `journal show <uid>` - Print every property of one entry
//! - `journal delete <uid>` - Delete an entry and its metadata
//! - `journal copy <uid> <mount point>` - Copy an entry elsewhere
//! - `journal values <property>` - Distinct values of a property
//!
//! ## Example Usage
//!
//! ```bash
//! # Favorite drawings on a USB stick, oldest first
//! journal query /media/usb --favorites --mime image/png --order-by +timestamp
//!
//! # Entries shared by a neighbour
//! journal query /tmp/10.0.0.7 --text "field trip"
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Journal - browse Sugar journal entries
#[derive(Parser)]
#[command(name = "journal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a mount point
    Query {
        /// Mount point to read ("/" is the object store)
        mount_point: String,

        /// Free text; quote a phrase to match it exactly
        #[arg(short, long)]
        text: Option<String>,

        /// Accepted mime types (can be used multiple times)
        #[arg(short, long)]
        mime: Vec<String>,

        /// Only favorites
        #[arg(short, long)]
        favorites: bool,

        /// Only entries created by this activity
        #[arg(short, long)]
        activity: Option<String>,

        /// Modified at or after (YYYY-MM-DD, RFC 3339 or epoch seconds)
        #[arg(long)]
        since: Option<String>,

        /// Modified at or before (YYYY-MM-DD, RFC 3339 or epoch seconds)
        #[arg(long)]
        until: Option<String>,

        /// Sort key such as -timestamp or +filesize (can be used multiple times)
        #[arg(short, long, allow_hyphen_values = true)]
        order_by: Vec<String>,

        /// Entries fetched per page
        #[arg(long, default_value = "10")]
        page_size: usize,

        /// Maximum number of entries to show
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Position of the first entry to show
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// Print every property of one entry
    Show {
        /// Object id or file path
        uid: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// Delete an entry and its metadata
    Delete {
        /// Object id or file path
        uid: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy an entry to another mount point
    Copy {
        /// Object id or file path
        uid: String,

        /// Destination mount point
        mount_point: String,
    },

    /// Distinct values of a property in the object store
    Values {
        /// Property name, e.g. activity
        property: String,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => journal_core::Config::load_from(path)?,
        None => journal_core::Config::load()?,
    };

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.general.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Query {
            mount_point,
            text,
            mime,
            favorites,
            activity,
            since,
            until,
            order_by,
            page_size,
            limit,
            offset,
            output,
        } => commands::query::run(
            config,
            commands::query::QueryOptions {
                mount_point,
                text,
                mime_types: mime,
                favorites,
                activity,
                since,
                until,
                order_by,
                page_size,
                limit,
                offset,
            },
            output,
        ),
        Commands::Show { uid, output } => commands::show::run(config, &uid, output),
        Commands::Delete { uid, yes } => commands::delete::run(config, &uid, yes),
        Commands::Copy { uid, mount_point } => commands::copy::run(config, &uid, &mount_point),
        Commands::Values { property } => commands::values::run(config, &property),
    }
}
