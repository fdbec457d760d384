//! Document CLI commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use super::output::Output;
use crate::storage::{Document, Site};

#[derive(Subcommand)]
pub enum DocCommands {
    /// Print a document
    Get {
        /// Document name relative to the storage root
        name: String,

        /// Read under the document lock
        #[arg(long)]
        safe: bool,
    },

    /// Write a document from a JSON string (atomic)
    Set {
        /// Document name relative to the storage root
        name: String,

        /// JSON body
        json: String,
    },

    /// Delete a document
    Delete {
        /// Document name relative to the storage root
        name: String,
    },

    /// List documents under the storage root
    List,
}

pub fn run(cmd: DocCommands, site: &Site, output: &Output) -> Result<()> {
    match cmd {
        DocCommands::Get { name, safe } => get(site, output, &name, safe),
        DocCommands::Set { name, json } => set(site, output, &name, &json),
        DocCommands::Delete { name } => delete(site, output, &name),
        DocCommands::List => list(site, output),
    }
}

fn get(site: &Site, output: &Output, name: &str, safe: bool) -> Result<()> {
    let store = site.documents();
    output.verbose_ctx("doc", &format!("Reading {} (safe={})", name, safe));

    let doc: Document = if safe {
        store.safe_read(name)?
    } else {
        store.read(name)?
    };

    output.data(&doc);
    Ok(())
}

fn set(site: &Site, output: &Output, name: &str, json: &str) -> Result<()> {
    let doc: Document =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON for {}", name))?;

    site.documents().atomic_write(name, &doc)?;
    output.success(&format!("Wrote {}", name));
    Ok(())
}

fn delete(site: &Site, output: &Output, name: &str) -> Result<()> {
    if !site.documents().delete(name)? {
        bail!("Document not found: {}", name);
    }
    output.success(&format!("Deleted {}", name));
    Ok(())
}

fn list(site: &Site, output: &Output) -> Result<()> {
    let names = site.document_names()?;

    if output.is_json() {
        output.data(&names);
    } else {
        for name in &names {
            output.row(&[name]);
        }
        if names.is_empty() {
            output.success("No documents");
        }
    }
    Ok(())
}
