//! Lock inspection commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::storage::Site;

#[derive(Subcommand)]
pub enum LockCommands {
    /// Show lock state for a document
    Status {
        /// Document name relative to the storage root
        name: String,
    },

    /// Remove a lock sentinel unconditionally
    Break {
        /// Document name relative to the storage root
        name: String,
    },
}

pub fn run(cmd: LockCommands, site: &Site, output: &Output) -> Result<()> {
    match cmd {
        LockCommands::Status { name } => status(site, output, &name),
        LockCommands::Break { name } => break_lock(site, output, &name),
    }
}

fn status(site: &Site, output: &Output, name: &str) -> Result<()> {
    let lock = site.documents().lock_for(name);
    let holder = lock.holder();
    // Note: probes staleness and may clean up an abandoned sentinel
    let locked = lock.is_locked();

    if output.is_json() {
        output.data(&serde_json::json!({
            "name": name,
            "locked": locked,
            "holder": holder.filter(|_| locked).map(|r| serde_json::json!({
                "pid": r.pid,
                "hostname": r.hostname,
                "ageSecs": r.age_secs(),
            })),
        }));
    } else if locked {
        match holder {
            Some(record) => output.success(&format!(
                "{} is locked by pid {} on {} ({}s ago)",
                name,
                record.pid,
                record.hostname,
                record.age_secs()
            )),
            None => output.success(&format!("{} is locked", name)),
        }
    } else {
        output.success(&format!("{} is not locked", name));
    }
    Ok(())
}

fn break_lock(site: &Site, output: &Output, name: &str) -> Result<()> {
    let lock = site.documents().lock_for(name);

    if lock.break_lock()? {
        output.success(&format!("Broke lock on {}", name));
    } else {
        output.success(&format!("{} was not locked", name));
    }
    Ok(())
}
