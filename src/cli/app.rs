//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{cache_cmd, doc_cmd, lock_cmd};
use crate::storage::Site;

#[derive(Parser)]
#[command(name = "larder")]
#[command(author, version, about = "File-backed JSON storage for content sites")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Storage root (defaults to the platform data directory)
    #[arg(long, global = true, env = "LARDER_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a storage root
    Init {
        /// Path to initialize (defaults to the resolved storage root)
        path: Option<PathBuf>,
    },

    /// Show a storage overview
    Status,

    /// Manage site documents
    #[command(subcommand)]
    Doc(doc_cmd::DocCommands),

    /// Manage the feed cache
    #[command(subcommand)]
    Cache(cache_cmd::CacheCommands),

    /// Inspect and break document locks
    #[command(subcommand)]
    Lock(lock_cmd::LockCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(cli.format, cli.verbose);

    match cli.command {
        Commands::Init { path } => {
            let root = Site::resolve_root(path.or(cli.root))?;
            output.verbose_ctx("init", &format!("Initializing storage root: {}", root.display()));
            let site = Site::init(&root)?;
            output.success(&format!(
                "Initialized storage root at {}",
                site.root().display()
            ));
        }

        Commands::Status => status(&open_site(cli.root)?, &output)?,
        Commands::Doc(cmd) => doc_cmd::run(cmd, &open_site(cli.root)?, &output)?,
        Commands::Cache(cmd) => cache_cmd::run(cmd, &open_site(cli.root)?, &output)?,
        Commands::Lock(cmd) => lock_cmd::run(cmd, &open_site(cli.root)?, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}

fn open_site(root: Option<PathBuf>) -> Result<Site> {
    Site::open(Site::resolve_root(root)?)
}

/// Storage overview: document count plus cache statistics
fn status(site: &Site, output: &Output) -> Result<()> {
    let documents = site.document_names()?;
    let stats = site.cache().stats()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "root": site.root().display().to_string(),
            "documents": documents.len(),
            "cache": {
                "entries": stats.total_items,
                "hits": stats.hits,
                "misses": stats.misses,
                "hitRatio": stats.hit_ratio(),
                "lastCleanup": stats.last_cleanup,
            },
        }));
    } else {
        println!("Storage root: {}", site.root().display());
        println!("Documents: {}", documents.len());
        println!(
            "Cache: {} entries, {} hits / {} misses ({:.1}%)",
            stats.total_items,
            stats.hits,
            stats.misses,
            stats.hit_ratio() * 100.0
        );
    }
    Ok(())
}
