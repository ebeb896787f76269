//! Document records exchanged between loaders and the ingestion pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to documents and indexed items.
pub type Metadata = serde_json::Map<String, Value>;

/// A loaded document: normalized text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Normalized text content. Never empty.
    pub content: String,
    /// Source metadata, always including the original reference under `"url"`.
    #[serde(rename = "meta_data")]
    pub metadata: Metadata,
}

impl DocumentRecord {
    /// Create a new record.
    pub fn new(content: String, metadata: Metadata) -> Self {
        Self { content, metadata }
    }

    /// The original source reference, if present.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(Value::as_str)
    }

    /// Title provided by the source, if any.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}
