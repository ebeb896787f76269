//! Load command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::loader::{Loader, YoutubeVideoLoader};
use anyhow::Result;

/// Run the load command: fetch one transcript and print the record as JSON.
pub async fn run_load(video: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Load, &settings)?;

    let loader = YoutubeVideoLoader::from_settings(&settings.youtube)?;

    let spinner = Output::spinner("Fetching transcript...");
    let records = loader.load_data(video).await;
    spinner.finish_and_clear();

    let records = records?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
