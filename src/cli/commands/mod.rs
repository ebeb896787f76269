//! CLI command implementations.

mod config;
mod count;
mod doctor;
mod ingest;
mod load;
mod query;
mod reset;

pub use config::run_config;
pub use count::run_count;
pub use doctor::run_doctor;
pub use ingest::run_ingest;
pub use load::run_load;
pub use query::run_query;
pub use reset::run_reset;

use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::vectordb::ElasticsearchDb;
use std::sync::Arc;

/// Settings with the `--app-id` override applied.
fn with_app_id(mut settings: Settings, app_id: Option<&str>) -> Settings {
    if let Some(app_id) = app_id {
        settings.collection.app_id = Some(app_id.to_string());
    }
    settings
}

/// Bind to the configured collection without creating its index. No
/// embedding request is made until a command adds or queries.
fn open_collection(settings: &Settings) -> crate::error::Result<ElasticsearchDb> {
    let dimensions = settings.embedding.dimensions as usize;
    let embedder = OpenAIEmbedder::with_config(&settings.embedding.model, dimensions)?;
    ElasticsearchDb::connect(
        &settings.elasticsearch,
        Arc::new(embedder),
        dimensions,
        &settings.collection.name,
    )
}
