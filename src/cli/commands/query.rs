//! Query command implementation.

use super::with_app_id;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the query command.
pub async fn run_query(
    text: &str,
    n_results: usize,
    app_id: Option<&str>,
    scores: bool,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Query, &settings)?;
    let settings = with_app_id(settings, app_id);
    let orchestrator = Orchestrator::new(&settings).await?;

    let spinner = Output::spinner("Searching...");
    if scores {
        let hits = orchestrator.query_with_scores(text, n_results).await;
        spinner.finish_and_clear();
        let hits = hits?;

        if hits.is_empty() {
            Output::warning("No results found matching your query.");
        }
        for (rank, hit) in hits.iter().enumerate() {
            let url = hit.metadata.get("url").and_then(|v| v.as_str());
            Output::scored_result(rank + 1, &hit.id, hit.score, &hit.text, url);
        }
    } else {
        let texts = orchestrator.query(text, n_results).await;
        spinner.finish_and_clear();
        let texts = texts?;

        if texts.is_empty() {
            Output::warning("No results found matching your query.");
        }
        for (rank, text) in texts.iter().enumerate() {
            Output::query_result(rank + 1, text);
        }
    }

    orchestrator.close().await?;
    Ok(())
}
