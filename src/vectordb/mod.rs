//! Vector database abstraction for Ragline.
//!
//! `ElasticsearchDb` stores texts, metadata and embeddings in one search
//! engine index per collection. The engine itself sits behind the
//! [`SearchEngine`] trait so the same adapter runs against a real cluster
//! ([`EsClient`]) or an in-process engine ([`MemoryEngine`]).

mod client;
mod elasticsearch;
mod memory;
pub mod query;

pub use client::EsClient;
pub use elasticsearch::ElasticsearchDb;
pub use memory::MemoryEngine;

use crate::document::Metadata;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Metadata key carrying the owning application id.
pub const APP_ID_KEY: &str = "app_id";

/// Derive the index backing a collection.
///
/// Collections with the same name but different embedding sizes live in
/// separate indices, so switching embedding models never mixes vectors.
pub fn index_name(collection_name: &str, vector_dimension: usize) -> String {
    format!("{}_{}", collection_name, vector_dimension)
}

/// Optional restriction applied to reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereFilter {
    /// Only match items whose `metadata.app_id` equals this value.
    pub app_id: Option<String>,
}

impl WhereFilter {
    /// A filter that matches everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Restrict to one owning application.
    pub fn app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
        }
    }

    /// Build a filter from a metadata-style mapping. Only `app_id` is recognised.
    pub fn from_map(map: &Metadata) -> Self {
        let app_id = map.get(APP_ID_KEY).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        Self { app_id }
    }
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Document id.
    pub id: String,
    /// Stored text.
    pub text: String,
    /// Stored metadata (empty when not requested).
    pub metadata: Metadata,
    /// Engine score; cosine similarity shifted by +1.0 into [0, 2].
    pub score: f32,
}

/// One document in a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    /// Target index.
    pub index: String,
    /// Document id; an existing document with the same id is overwritten.
    pub id: String,
    /// Document body.
    pub source: Value,
}

/// Minimal search engine surface the adapter relies on.
///
/// Request and response bodies use the Elasticsearch JSON shapes.
/// Searches and counts against a missing index fail with
/// [`RaglineError::NotFound`](crate::error::RaglineError::NotFound).
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Check whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an index with the given settings/mappings body. Creating an
    /// index that already exists is a no-op.
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Delete an index.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Submit a bulk write and return the raw bulk response.
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Value>;

    /// Make recent writes visible to searches.
    async fn refresh(&self, index: &str) -> Result<()>;

    /// Run a search request and return the raw response.
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;

    /// Count documents matching a query body.
    async fn count(&self, index: &str, body: &Value) -> Result<u64>;

    /// Release the underlying connection. Later calls fail.
    async fn close(&self) -> Result<()>;

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

/// Trait for vector database implementations.
#[async_trait]
pub trait VectorDb: Send + Sync {
    /// Return the subset of `ids` already stored (and matching `filter`).
    async fn exists(&self, ids: &[String], filter: &WhereFilter) -> Result<HashSet<String>>;

    /// Embed and store texts with their metadata under the given ids.
    async fn add(&self, texts: &[String], metadatas: &[Metadata], ids: &[String]) -> Result<()>;

    /// Return up to `n_results` stored texts most similar to `input_query`.
    async fn query(
        &self,
        input_query: &str,
        n_results: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<String>>;

    /// Total number of stored documents.
    async fn count(&self) -> Result<usize>;

    /// Drop every stored document.
    async fn reset(&self) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
