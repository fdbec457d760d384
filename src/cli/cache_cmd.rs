//! Cache CLI commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use super::output::Output;
use crate::storage::{Document, Site};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show a cached entry, including stale ones
    Get {
        /// Feed key
        key: String,

        /// Only print an unexpired payload
        #[arg(long)]
        fresh: bool,
    },

    /// Store a payload under a key
    Store {
        /// Feed key
        key: String,

        /// JSON payload
        json: String,

        /// Time-to-live in seconds (defaults to the configured ttl)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Remove one entry
    Delete {
        /// Feed key
        key: String,
    },

    /// List cached entries
    List,

    /// Remove expired entries
    Cleanup,

    /// Remove all entries and reset statistics
    Clear,

    /// Show cache statistics
    Stats,
}

pub fn run(cmd: CacheCommands, site: &Site, output: &Output) -> Result<()> {
    match cmd {
        CacheCommands::Get { key, fresh } => get(site, output, &key, fresh),
        CacheCommands::Store { key, json, ttl } => store(site, output, &key, &json, ttl),
        CacheCommands::Delete { key } => delete(site, output, &key),
        CacheCommands::List => list(site, output),
        CacheCommands::Cleanup => cleanup(site, output),
        CacheCommands::Clear => clear(site, output),
        CacheCommands::Stats => stats(site, output),
    }
}

fn get(site: &Site, output: &Output, key: &str, fresh: bool) -> Result<()> {
    let cache = site.cache();

    if fresh {
        match cache.get_fresh(key)? {
            Some(data) => output.data(&data),
            None => bail!("No fresh entry for key: {}", key),
        }
    } else {
        match cache.get(key)? {
            Some(entry) => output.data(&entry),
            None => bail!("No entry for key: {}", key),
        }
    }
    Ok(())
}

fn store(site: &Site, output: &Output, key: &str, json: &str, ttl: Option<u64>) -> Result<()> {
    let data: Document =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON for key {}", key))?;

    let entry = site.cache().store(key, data, ttl)?;
    match entry.ttl {
        Some(secs) => output.success(&format!("Cached {} (ttl {}s)", key, secs)),
        None => output.success(&format!("Cached {} (no expiry)", key)),
    }
    Ok(())
}

fn delete(site: &Site, output: &Output, key: &str) -> Result<()> {
    if !site.cache().delete(key)? {
        bail!("No entry for key: {}", key);
    }
    output.success(&format!("Deleted {}", key));
    Ok(())
}

fn list(site: &Site, output: &Output) -> Result<()> {
    let entries = site.cache().entries()?;

    if output.is_json() {
        output.data(&entries);
    } else {
        for entry in &entries {
            let state = if entry.is_expired() { "expired" } else { "fresh" };
            let ttl = entry
                .ttl
                .map(|secs| format!("{}s", secs))
                .unwrap_or_else(|| "-".to_string());
            output.row(&[&entry.key, state, &ttl]);
        }
        if entries.is_empty() {
            output.success("Cache is empty");
        }
    }
    Ok(())
}

fn cleanup(site: &Site, output: &Output) -> Result<()> {
    output.verbose("Scanning cache entries for expired ttls");
    let removed = site.cache().cleanup()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "removed": removed }));
    } else {
        output.success(&format!("Removed {} expired entries", removed));
    }
    Ok(())
}

fn clear(site: &Site, output: &Output) -> Result<()> {
    let removed = site.cache().clear()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "removed": removed }));
    } else {
        output.success(&format!(
            "Removed {} entries and reset statistics",
            removed
        ));
    }
    Ok(())
}

fn stats(site: &Site, output: &Output) -> Result<()> {
    let stats = site.cache().stats()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "hits": stats.hits,
            "misses": stats.misses,
            "hitRatio": stats.hit_ratio(),
            "totalItems": stats.total_items,
            "lastCleanup": stats.last_cleanup,
        }));
    } else {
        println!("Cache Statistics");
        println!("{}", "=".repeat(40));
        println!("Entries: {}", stats.total_items);
        println!("Hits: {}", stats.hits);
        println!("Misses: {}", stats.misses);
        println!("Hit ratio: {:.1}%", stats.hit_ratio() * 100.0);
        match stats.last_cleanup {
            Some(at) => println!("Last cleanup: {}", at.to_rfc3339()),
            None => println!("Last cleanup: never"),
        }
    }
    Ok(())
}
