//! Count command implementation.

use super::open_collection;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::vectordb::VectorDb;
use anyhow::Result;

/// Run the count command.
pub async fn run_count(settings: Settings) -> Result<()> {
    preflight::check(Operation::Maintain, &settings)?;
    let db = open_collection(&settings)?;

    let count = db.count().await?;
    Output::kv("Index", db.index_name());
    Output::kv("Documents", &count.to_string());

    db.close().await?;
    Ok(())
}
