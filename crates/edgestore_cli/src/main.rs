//! EdgeStore CLI
//!
//! Command-line tools for inspecting EdgeStore snapshot backups.
//!
//! # Commands
//!
//! - `info` - Display the backup manifest
//! - `verify` - Decode every snapshot the manifest names
//! - `dump` - Print the entries of one entity

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EdgeStore backup tools.
#[derive(Parser)]
#[command(name = "edgestore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the backup directory (holding meta.json)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the backup manifest and snapshot file sizes
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decode every snapshot named by the manifest
    Verify {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the entries of one entity
    Dump {
        /// Entity name
        #[arg(short, long)]
        entity: String,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Info { format } => {
            let path = cli.path.ok_or("Backup path required for info")?;
            commands::info::run(&path, &format).await?;
        }
        Commands::Verify { format } => {
            let path = cli.path.ok_or("Backup path required for verify")?;
            commands::verify::run(&path, &format).await?;
        }
        Commands::Dump {
            entity,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Backup path required for dump")?;
            commands::dump::run(&path, &entity, limit, &format).await?;
        }
        Commands::Version => {
            println!("EdgeStore CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
