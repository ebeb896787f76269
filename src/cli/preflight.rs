//! Pre-flight checks before network operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{RaglineError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Loading only talks to YouTube.
    Load,
    /// Ingesting embeds chunks and writes to Elasticsearch.
    Ingest,
    /// Querying embeds the query and searches Elasticsearch.
    Query,
    /// Counting and resetting only need Elasticsearch.
    Maintain,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Load => {}
        Operation::Ingest | Operation::Query => {
            check_api_key()?;
            check_elasticsearch_url(settings)?;
        }
        Operation::Maintain => {
            check_elasticsearch_url(settings)?;
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(RaglineError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(RaglineError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

fn check_elasticsearch_url(settings: &Settings) -> Result<()> {
    match settings.elasticsearch.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(RaglineError::Config(
            "Elasticsearch URL not set. Add [elasticsearch] url to the config or set ELASTICSEARCH_URL"
                .to_string(),
        )),
    }
}
