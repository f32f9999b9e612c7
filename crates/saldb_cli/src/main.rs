//! SalDB CLI
//!
//! Command-line tools for saved SalDB state files.
//!
//! # Commands
//!
//! - `log` - Print the revision log
//! - `tags` - Print the tag table
//! - `indexes` - Print index definitions
//! - `forget` - Drop revisions older than a cutoff
//! - `rollback` - Remove the latest revision

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SalDB command-line state tools.
#[derive(Parser)]
#[command(name = "saldb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the saved state file
    #[arg(global = true, short, long)]
    state: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the revision log
    Log {
        /// Print only the newest N revisions
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the tag table
    Tags {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print index definitions
    Indexes {
        /// Include built-in indexes
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drop every revision older than a cutoff
    Forget {
        /// Oldest revision id to keep
        cutoff: u64,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove the latest revision
    Rollback {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Log { limit, format } => {
            let path = cli.state.ok_or("State file required for log")?;
            commands::log::run(&path, limit, &format)?;
        }
        Commands::Tags { format } => {
            let path = cli.state.ok_or("State file required for tags")?;
            commands::tags::run(&path, &format)?;
        }
        Commands::Indexes { all, format } => {
            let path = cli.state.ok_or("State file required for indexes")?;
            commands::indexes::run(&path, all, &format)?;
        }
        Commands::Forget { cutoff, dry_run } => {
            let path = cli.state.ok_or("State file required for forget")?;
            commands::forget::run(&path, cutoff, dry_run)?;
        }
        Commands::Rollback { dry_run } => {
            let path = cli.state.ok_or("State file required for rollback")?;
            commands::rollback::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("SalDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SalDB Core v{}", saldb_core::VERSION);
        }
    }

    Ok(())
}
