//! kvsync CLI
//!
//! Command-line tools for inspecting and syncing kvsync stores.
//!
//! # Commands
//!
//! - `list` - List entries, optionally restricted to one bucket
//! - `buckets` - List buckets holding entries
//! - `get` / `set` / `remove` / `clear` - Edit the local store
//! - `snapshot` - Print the push body a bucket would be sent as
//! - `sync` - Reconcile with a remote endpoint and push local changes

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// kvsync command-line store tools.
#[derive(Parser)]
#[command(name = "kvsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// List entries
    List {
        /// Only list entries of this bucket
        #[arg(short, long)]
        bucket: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List buckets holding at least one entry
    Buckets,

    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        key: String,

        /// JSON value (bare words are stored as strings)
        value: String,

        /// Bucket to tag the entry with
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Remove a key
    Remove {
        /// Key to remove
        key: String,
    },

    /// Remove every local entry
    Clear,

    /// Print the push body of a bucket
    Snapshot {
        /// Bucket to print (global if omitted)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Reconcile with a remote store and push local changes
    Sync {
        /// Base URL of the remote store
        #[arg(short, long)]
        endpoint: String,

        /// Credential sent with every request
        #[arg(short, long, env = "KVSYNC_TOKEN")]
        token: Option<String>,

        /// Extra bucket to reconcile (repeatable)
        #[arg(short, long)]
        bucket: Vec<String>,

        /// Re-stamp local data so it wins everywhere
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = cli.path.ok_or("Store path required (--path)")?;

    match cli.command {
        Commands::List { bucket, format } => {
            commands::list::entries(&path, bucket.as_deref(), &format)?;
        }
        Commands::Buckets => commands::list::buckets(&path)?,
        Commands::Get { key } => commands::edit::get(&path, &key)?,
        Commands::Set { key, value, bucket } => {
            commands::edit::set(&path, &key, &value, bucket.as_deref())?;
        }
        Commands::Remove { key } => commands::edit::remove(&path, &key)?,
        Commands::Clear => commands::edit::clear(&path)?,
        Commands::Snapshot { bucket } => commands::snapshot::run(&path, bucket.as_deref())?,
        Commands::Sync {
            endpoint,
            token,
            bucket,
            force,
        } => {
            commands::sync::run(&path, &endpoint, token, &bucket, force)?;
        }
    }

    Ok(())
}
