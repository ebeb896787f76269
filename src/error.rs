//! Error types for Ragline.

use thiserror::Error;

/// A single document the search engine rejected during a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    /// Caller-assigned document id.
    pub id: String,
    /// Reason reported by the engine.
    pub reason: String,
}

impl std::fmt::Display for BulkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.reason)
    }
}

/// Library-level error type for Ragline operations.
#[derive(Error, Debug)]
pub enum RaglineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bulk write rejected {} document(s): {}", .failures.len(), format_failures(.failures))]
    PartialWrite { failures: Vec<BulkFailure> },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl RaglineError {
    /// Wrap a transport failure with the operation that hit it.
    pub fn unavailable(context: &str, err: impl std::fmt::Display) -> Self {
        RaglineError::SourceUnavailable(format!("{}: {}", context, err))
    }
}

fn format_failures(failures: &[BulkFailure]) -> String {
    const SHOWN: usize = 3;
    let mut listed: Vec<String> = failures.iter().take(SHOWN).map(|f| f.to_string()).collect();
    if failures.len() > SHOWN {
        listed.push(format!("and {} more", failures.len() - SHOWN));
    }
    listed.join("; ")
}

/// Result type alias for Ragline operations.
pub type Result<T> = std::result::Result<T, RaglineError>;
