//! Reset command implementation.

use super::open_collection;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::vectordb::VectorDb;
use anyhow::Result;
use console::Term;

/// Run the reset command, asking for confirmation unless `yes` is set.
pub async fn run_reset(yes: bool, settings: Settings) -> Result<()> {
    preflight::check(Operation::Maintain, &settings)?;
    let db = open_collection(&settings)?;

    if !yes {
        let term = Term::stderr();
        term.write_str(&format!(
            "Delete index {} and all its documents? [y/N] ",
            db.index_name()
        ))?;
        let answer = term.read_line()?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            Output::info("Aborted.");
            db.close().await?;
            return Ok(());
        }
    }

    db.reset().await?;
    Output::success(&format!("Reset {}", db.index_name()));

    db.close().await?;
    Ok(())
}
