//! Ingest command implementation.

use super::with_app_id;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the ingest command.
pub async fn run_ingest(video: &str, app_id: Option<&str>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let settings = with_app_id(settings, app_id);

    let orchestrator = Orchestrator::new(&settings).await?;
    Output::info(&format!("Ingesting {} into {}", video, orchestrator.vector_db().index_name()));

    let spinner = Output::spinner("Loading, chunking and embedding...");
    let result = orchestrator.ingest(video).await;
    spinner.finish_and_clear();

    match result {
        Ok(result) => {
            Output::success(&format!(
                "Added {} new chunks ({} already indexed)",
                result.chunks_added,
                result.chunks_skipped()
            ));
            orchestrator.close().await?;
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Ingest failed: {}", e));
            Err(e.into())
        }
    }
}
